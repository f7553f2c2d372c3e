//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The tail-call eligibility analyzer.
//!
//! A pure short-circuit predicate chain over the call description, the
//! enclosing function's ABI state, and the target's convention metadata.
//! The first failing check wins and emits a traced rejection reason; the
//! trace is a debugging aid, not part of the functional contract.

use crate::abi::{CallInfo, LowerCtx, Part, Slot, TargetAbi};
use crate::mir::{Inst, Loc};

/// Decides whether `info` can be lowered as a tail call (a sibling call,
/// or a frame-resizing tail call under the guaranteed-TCO policy) instead
/// of a standard call.
///
/// `in_parts` are the call's return-value parts and `out_parts` its
/// outgoing argument parts, both already split to scalars.
pub fn is_eligible_for_tail_call(
    ctx: &LowerCtx<'_>,
    info: &CallInfo,
    in_parts: &[Part],
    out_parts: &[Part],
) -> bool {
    if !info.tail_call {
        return false;
    }

    log::debug!("attempting to lower call as tail call");

    if info.error_value.is_some() {
        // the error value is rebound after the call returns, which has no
        // "after" once the call is a tail call
        log::debug!("... cannot handle tail calls with indirect-error values");
        return false;
    }

    if !ctx.abi.may_tail_call(info.conv) && !ctx.abi.guarantees_tco(info.conv) {
        log::debug!("... calling convention cannot be tail called");
        return false;
    }

    // by-ref parameters hand the callee a pointer directly into the stack
    // area a tail call wants to reuse; forced-register and indirect-error
    // parameters pin state the tail call would clobber
    if ctx
        .func
        .param_flags()
        .iter()
        .any(|flags| flags.blocks_frame_reuse())
    {
        log::debug!(
            "... cannot tail call from callers with by-ref, forced-register, \
             or indirect-error parameters"
        );
        return false;
    }

    if ctx.options.guaranteed_tail_calls {
        return ctx.abi.guarantees_tco(info.conv) && info.conv == ctx.func.conv();
    }

    // without the guaranteed-TCO policy we may only emit ABI-preserving
    // sibling calls; conventions are allowed to differ if they provably
    // treat the result and the preserved registers the same way
    if !results_compatible(ctx, info, in_parts) {
        log::debug!("... caller and callee have incompatible calling conventions");
        return false;
    }

    if !outgoing_args_fit(ctx, info, out_parts) {
        return false;
    }

    log::debug!("... call is eligible for tail call optimization");

    true
}

/// Checks that the caller and callee handle the call's result the same way:
/// identical slot assignment for every part under both conventions, and a
/// callee that preserves at least every register the caller preserves.
fn results_compatible(ctx: &LowerCtx<'_>, info: &CallInfo, in_parts: &[Part]) -> bool {
    let caller = ctx.func.conv();

    // matching conventions trivially handle everything the same way
    if info.conv == caller {
        return true;
    }

    let callee_view = ctx.abi.classify_rets(info.conv, in_parts, info.variadic);
    let caller_view = ctx.abi.classify_rets(caller, in_parts, info.variadic);

    let same_slots = match (callee_view, caller_view) {
        (Ok(callee), Ok(caller)) => callee.slots == caller.slots,
        _ => false,
    };

    same_slots
        && ctx
            .abi
            .preserved_mask(caller)
            .is_subset_of(&ctx.abi.preserved_mask(info.conv))
}

/// Checks that the callee's outgoing arguments can live inside the
/// caller's own incoming argument area without clobbering state the
/// caller's caller expects preserved.
fn outgoing_args_fit(ctx: &LowerCtx<'_>, info: &CallInfo, out_parts: &[Part]) -> bool {
    if out_parts.is_empty() {
        return true;
    }

    let assignment = match ctx.abi.classify_args(info.conv, out_parts, info.variadic) {
        Ok(assignment) => assignment,
        Err(_) => {
            log::debug!("... could not analyze call operands");
            return false;
        }
    };

    // a sibling call does not grow the frame, so the outgoing arguments
    // must fit in the area the caller itself was given
    if assignment.stack_bytes > ctx.func.incoming_arg_bytes().unwrap_or(0) {
        log::debug!("... cannot fit call operands on caller's stack");
        return false;
    }

    let caller_preserved = ctx.abi.preserved_mask(ctx.func.conv());

    for (part, slot) in out_parts.iter().zip(assignment.slots.iter()) {
        let reg = match *slot {
            Slot::Stack { .. } => {
                if info.variadic {
                    log::debug!("... cannot tail call variadic function with stack arguments");
                    return false;
                }

                continue;
            }
            Slot::Reg(reg) => reg,
        };

        // registers the caller's convention clobbers anyway are free game
        if !caller_preserved.preserves(reg) {
            continue;
        }

        // a preserved register may only carry a value the caller itself
        // received in that exact register, i.e. an unmodified pass-through
        match ctx.stream.def_ignoring_copies(part.value) {
            Some(Inst::Move(mov)) if mov.src == Loc::Phys(reg) => {}
            _ => {
                log::debug!("... argument in preserved register is not a pass-through");
                return false;
            }
        }
    }

    true
}
