//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The call sequence builder: orchestrates the lowering of one call site
//! into either a standard call sequence or a tail call.

use crate::abi::handlers::{
    drive_assignments, CallArgHandler, CallReturnHandler, TailCallArgHandler,
};
use crate::abi::{
    is_eligible_for_tail_call, ArgFlags, ConventionId, LowerCtx, LowerError, LowerResult, Part,
    TargetAbi,
};
use crate::frame::{AdjustmentOracle, FrameLayout};
use crate::mir::{
    AbiType, Call, CallFrameDestroy, CallFrameSetup, CalleeOperand, Inst, Loc, MachineStream,
    Merge, Move, TailReturn, Ty, Unmerge, Value,
};
use smallvec::SmallVec;

/// Def chains are acyclic under the stream's SSA discipline; the bound only
/// caps the walk on malformed input.
const CALLEE_CHAIN_LIMIT: usize = 64;

/// One outgoing argument of a call site.
#[derive(Clone, Debug)]
pub struct CallArg {
    /// The value being passed
    pub value: Value,
    /// The argument's logical type
    pub ty: AbiType,
    /// The argument's ABI attributes
    pub flags: ArgFlags,
}

impl CallArg {
    /// Creates an argument with no attributes.
    pub fn new(value: Value, ty: AbiType) -> Self {
        Self {
            value,
            ty,
            flags: ArgFlags::default(),
        }
    }
}

/// The result a call site expects back.
#[derive(Clone, Debug)]
pub struct CallRet {
    /// The value the result is captured into
    pub value: Value,
    /// The result's logical type
    pub ty: AbiType,
}

/// A complete description of one call site: the immutable input to one
/// call-lowering invocation.
#[derive(Clone, Debug)]
pub struct CallInfo {
    /// The callee, possibly still hidden behind no-op value chains
    pub callee: CalleeOperand,
    /// The calling convention of the call
    pub conv: ConventionId,
    /// The outgoing arguments, in order
    pub args: Vec<CallArg>,
    /// The expected result, if the callee returns one
    pub ret: Option<CallRet>,
    /// Whether tail-call lowering was requested
    pub tail_call: bool,
    /// Whether tail-call lowering is *mandatory*: if eligibility fails, the
    /// whole lowering fails rather than silently downgrading
    pub must_tail: bool,
    /// Whether the call is variadic
    pub variadic: bool,
    /// A value carrying indirect-error plumbing across the call, if any
    pub error_value: Option<Value>,
}

/// Which shape a successfully lowered call ended up with.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LoweredCall {
    /// A standard call sequence was emitted
    Normal,
    /// A tail-return was emitted instead of a call/return pair
    Tail,
}

/// Lowers one call site into `ctx`.
///
/// Resolves the callee through no-op value chains, splits arguments and
/// result into scalar parts, consults the tail-call analyzer, and emits
/// either a tail call or the standard sequence of frame markers, argument
/// marshalling, call instruction and result capture.
pub fn lower_call(ctx: &mut LowerCtx<'_>, info: &CallInfo) -> LowerResult<LoweredCall> {
    let callee = resolve_callee(ctx.stream, info.callee.clone());

    let mut out_parts = Vec::new();

    for arg in &info.args {
        let before = out_parts.len();

        split_outgoing(ctx.stream, arg.value, &arg.ty, arg.flags, &mut out_parts);

        if out_parts.len() - before > 1 && (arg.flags.sret || info.variadic) {
            return Err(LowerError::MultiPartValue {
                what: if arg.flags.sret {
                    "struct-return argument"
                } else {
                    "variadic argument"
                },
            });
        }
    }

    let (in_parts, merge) = match &info.ret {
        Some(ret) => split_result(ctx.stream, ret),
        None => (Vec::new(), None),
    };

    let eligible = is_eligible_for_tail_call(ctx, info, &in_parts, &out_parts);

    if info.must_tail && !eligible {
        // downgrading a mandatory tail call would change the semantics the
        // caller explicitly required
        log::debug!("failed to lower mandatory tail call as tail call");
        return Err(LowerError::MandatoryTailCall);
    }

    if eligible {
        return lower_tail_call(ctx, info, callee, &out_parts);
    }

    let setup_idx = ctx.stream.push(Inst::CallFrameSetup(CallFrameSetup {
        bytes: 0,
        setup_adjust: 0,
        scratch: None,
        clobbers_flags: false,
    }));

    let assignment = ctx.abi.classify_args(info.conv, &out_parts, info.variadic)?;
    let mut handler = CallArgHandler::new(ctx);

    drive_assignments(&mut handler, ctx, info.conv, &out_parts, &assignment);

    let call_idx = ctx.stream.push(Inst::Call(Call {
        callee,
        preserved: ctx.abi.preserved_mask(info.conv),
        uses: handler.take_uses(),
        defs: SmallVec::new(),
    }));

    // in symmetry with the arguments, result registers become implicit
    // defs of the call instruction during capture
    if !in_parts.is_empty() {
        let rets = ctx.abi.classify_rets(info.conv, &in_parts, info.variadic)?;

        drive_assignments(
            &mut CallReturnHandler::new(call_idx),
            ctx,
            info.conv,
            &in_parts,
            &rets,
        );

        if let Some(merge) = merge {
            ctx.stream.push(Inst::Merge(merge));
        }
    }

    let frame = handler.frame_state();

    match ctx.stream.inst_mut(setup_idx) {
        Inst::CallFrameSetup(setup) => {
            setup.bytes = frame.committed_bytes;
            setup.setup_adjust = frame.setup_adjust;
        }
        _ => unreachable!(),
    }

    let destroy_idx = ctx.stream.push(Inst::CallFrameDestroy(CallFrameDestroy {
        bytes: frame.committed_bytes,
        destroy_adjust: 0,
        scratch: None,
        clobbers_flags: false,
    }));

    // the setup marker only has to adjust for what the pushes did not
    // already cover; the destroy marker tears down the whole area
    attach_adjustment_clobbers(ctx, setup_idx, frame.committed_bytes - frame.setup_adjust);
    attach_adjustment_clobbers(ctx, destroy_idx, frame.committed_bytes);

    Ok(LoweredCall::Normal)
}

/// Lowers an eligible call as a tail call.
///
/// For sibling calls the callee consumes the caller's existing argument
/// area in place; under the guaranteed-TCO policy the frame may grow or
/// shrink by an explicit delta instead.
pub(crate) fn lower_tail_call(
    ctx: &mut LowerCtx<'_>,
    info: &CallInfo,
    callee: CalleeOperand,
    out_parts: &[Part],
) -> LowerResult<LoweredCall> {
    if ctx.options.branch_target_enforcement && callee.is_reg() {
        log::debug!("cannot lower indirect tail calls under branch-target enforcement");
        return Err(LowerError::BranchTargetEnforcement);
    }

    let sibling = !ctx.options.guaranteed_tail_calls;

    let setup_idx = if sibling {
        None
    } else {
        Some(ctx.stream.push(Inst::CallFrameSetup(CallFrameSetup {
            bytes: 0,
            setup_adjust: 0,
            scratch: None,
            clobbers_flags: false,
        })))
    };

    // total outgoing bytes must be known before any store is emitted,
    // because stores target the callee's eventual frame layout
    let assignment = ctx.abi.classify_args(info.conv, out_parts, info.variadic)?;

    let frame_delta = if sibling {
        // the caller will deallocate its entire frame and the callee still
        // expects its arguments at the stack pointer, so the delta is zero
        0
    } else {
        // negative when the callee needs more space than the caller's own
        // incoming area provides, positive when it needs less
        ctx.func.incoming_arg_bytes().unwrap_or(0) as i64 - assignment.stack_bytes as i64
    };

    let mut handler = TailCallArgHandler::new(frame_delta);

    drive_assignments(&mut handler, ctx, info.conv, out_parts, &assignment);

    if let Some(idx) = setup_idx {
        match ctx.stream.inst_mut(idx) {
            Inst::CallFrameSetup(setup) => setup.bytes = assignment.stack_bytes,
            _ => unreachable!(),
        }

        // the sequence ends *before* the tail-return: the arguments were
        // laid out for where the stack pointer will be after the reset
        ctx.stream.push(Inst::CallFrameDestroy(CallFrameDestroy {
            bytes: assignment.stack_bytes,
            destroy_adjust: 0,
            scratch: None,
            clobbers_flags: false,
        }));
    }

    ctx.stream.push(Inst::TailReturn(TailReturn {
        callee,
        preserved: ctx.abi.preserved_mask(info.conv),
        uses: handler.take_uses(),
        frame_delta: (!sibling).then_some(frame_delta),
    }));

    ctx.frame.mark_has_tail_call();

    Ok(LoweredCall::Tail)
}

/// Consults the cost oracle for the marker at `idx`, which must adjust the
/// stack pointer by `bytes`, and attaches the chosen strategy's declared
/// clobbers: a fresh dead-def scratch value and/or a flags clobber.
fn attach_adjustment_clobbers(ctx: &mut LowerCtx<'_>, idx: usize, bytes: u64) {
    let clobbers = ctx.oracle.cheapest(bytes).clobbers();
    let scratch = clobbers
        .scratch
        .then(|| ctx.stream.create_value(Ty::int(ctx.abi.ptr_ty().bits())));

    match ctx.stream.inst_mut(idx) {
        Inst::CallFrameSetup(marker) => {
            marker.scratch = scratch;
            marker.clobbers_flags = clobbers.flags;
        }
        Inst::CallFrameDestroy(marker) => {
            marker.scratch = scratch;
            marker.clobbers_flags = clobbers.flags;
        }
        _ => unreachable!(),
    }
}

/// Resolves a callee operand to its most concrete known definition by
/// walking through no-op value chains: copies, global-address
/// materialization, int-to-pointer casts and constants.
///
/// The walk reads the def graph without mutating it.
fn resolve_callee(stream: &MachineStream, mut callee: CalleeOperand) -> CalleeOperand {
    for _ in 0..CALLEE_CHAIN_LIMIT {
        let value = match callee {
            CalleeOperand::Reg(value) => value,
            concrete => return concrete,
        };

        callee = match stream.def_of(value) {
            Some(Inst::Move(Move {
                src: Loc::Val(src), ..
            })) => CalleeOperand::Reg(*src),
            Some(Inst::GlobalAddr(global)) => CalleeOperand::Symbol(global.symbol.clone()),
            Some(Inst::IntToPtr(cast)) => CalleeOperand::Reg(cast.src),
            Some(Inst::Constant(constant)) => CalleeOperand::Imm(constant.value),
            _ => return CalleeOperand::Reg(value),
        };
    }

    callee
}

/// Splits one outgoing logical value into scalar parts, emitting an
/// unmerge for multi-element aggregates. Zero-sized values contribute no
/// parts.
fn split_outgoing(
    stream: &mut MachineStream,
    value: Value,
    ty: &AbiType,
    flags: ArgFlags,
    parts: &mut Vec<Part>,
) {
    match ty {
        AbiType::Scalar(ty) if ty.bytes() == 0 => {}
        AbiType::Scalar(ty) => parts.push(Part {
            value,
            ty: *ty,
            flags,
        }),
        AbiType::Aggregate(elems) => match elems.as_slice() {
            [] => {}
            [single] => parts.push(Part {
                value,
                ty: *single,
                flags,
            }),
            elems => {
                let values: SmallVec<[Value; 2]> =
                    elems.iter().map(|&ty| stream.create_value(ty)).collect();

                stream.push(Inst::Unmerge(Unmerge {
                    parts: values.clone(),
                    src: value,
                }));

                parts.extend(values.iter().zip(elems).map(|(&value, &ty)| Part {
                    value,
                    ty,
                    flags,
                }));
            }
        },
    }
}

/// Splits the result a call site expects into scalar parts. For
/// multi-element aggregates the parts are fresh values, and the returned
/// merge rebuilds the logical result from them after capture.
fn split_result(stream: &mut MachineStream, ret: &CallRet) -> (Vec<Part>, Option<Merge>) {
    let flags = ArgFlags::default();

    match &ret.ty {
        AbiType::Scalar(ty) if ty.bytes() == 0 => (Vec::new(), None),
        AbiType::Scalar(ty) => (
            vec![Part {
                value: ret.value,
                ty: *ty,
                flags,
            }],
            None,
        ),
        AbiType::Aggregate(elems) => match elems.as_slice() {
            [] => (Vec::new(), None),
            [single] => (
                vec![Part {
                    value: ret.value,
                    ty: *single,
                    flags,
                }],
                None,
            ),
            elems => {
                let values: SmallVec<[Value; 2]> =
                    elems.iter().map(|&ty| stream.create_value(ty)).collect();

                let parts = values
                    .iter()
                    .zip(elems)
                    .map(|(&value, &ty)| Part { value, ty, flags })
                    .collect();

                (
                    parts,
                    Some(Merge {
                        dst: ret.value,
                        parts: values,
                    }),
                )
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{GlobalAddr, Ty};
    use crate::testing::{self, TestBed};
    use smallvec::smallvec;

    const I64: Ty = Ty::int(64);

    fn call(bed: &mut TestBed, conv: ConventionId, n_args: usize) -> CallInfo {
        let args = (0..n_args)
            .map(|_| CallArg::new(bed.stream.create_value(I64), AbiType::Scalar(I64)))
            .collect();

        CallInfo {
            callee: CalleeOperand::Symbol("callee".into()),
            conv,
            args,
            ret: None,
            tail_call: false,
            must_tail: false,
            variadic: false,
            error_value: None,
        }
    }

    fn count_matching(bed: &TestBed, pred: impl Fn(&Inst) -> bool) -> usize {
        bed.stream.insts().iter().filter(|inst| pred(inst)).count()
    }

    #[test]
    fn register_only_call_commits_zero_bytes() {
        let mut bed = TestBed::new(testing::STD, false);
        let info = call(&mut bed, testing::STD, 2);

        let outcome = lower_call(&mut bed.ctx(), &info).unwrap();
        assert_eq!(outcome, LoweredCall::Normal);

        let insts = bed.stream.insts();

        assert_eq!(
            insts[0],
            Inst::CallFrameSetup(CallFrameSetup {
                bytes: 0,
                setup_adjust: 0,
                scratch: None,
                clobbers_flags: false,
            })
        );
        assert!(matches!(insts[1], Inst::Move(_)));
        assert!(matches!(insts[2], Inst::Move(_)));

        match &insts[3] {
            Inst::Call(call) => {
                assert_eq!(call.callee, CalleeOperand::Symbol("callee".into()));
                assert_eq!(call.uses.as_slice(), &[testing::R0, testing::R1]);
                assert!(call.defs.is_empty());
            }
            other => panic!("expected call, got {other:?}"),
        }

        assert_eq!(
            insts[4],
            Inst::CallFrameDestroy(CallFrameDestroy {
                bytes: 0,
                destroy_adjust: 0,
                scratch: None,
                clobbers_flags: false,
            })
        );
    }

    #[test]
    fn stack_arguments_are_pushed_and_recorded_in_markers() {
        let mut bed = TestBed::new(testing::STD, false);
        let info = call(&mut bed, testing::STD, 5);

        lower_call(&mut bed.ctx(), &info).unwrap();

        // both stack slots were contributed by pushes
        match bed.stream.inst(0) {
            Inst::CallFrameSetup(setup) => {
                assert_eq!(setup.bytes, 16);
                assert_eq!(setup.setup_adjust, 16);
                // pushes cover the whole area, nothing left to adjust
                assert!(setup.scratch.is_none());
            }
            other => panic!("expected setup marker, got {other:?}"),
        }

        assert_eq!(count_matching(&bed, |inst| matches!(inst, Inst::Push(_))), 2);

        match bed.stream.insts().last().unwrap() {
            Inst::CallFrameDestroy(destroy) => {
                assert_eq!(destroy.bytes, 16);
                assert_eq!(destroy.destroy_adjust, 0);
                // tearing down 16 bytes takes the scratch-register strategy
                assert!(destroy.scratch.is_some());
                assert!(!destroy.clobbers_flags);
            }
            other => panic!("expected destroy marker, got {other:?}"),
        }
    }

    #[test]
    fn large_frames_attach_oracle_clobbers() {
        let mut bed = TestBed::new(testing::STD, false);

        // 21 args: 18 stack slots, 144 bytes, deep into `Large` territory
        let info = call(&mut bed, testing::STD, 21);

        lower_call(&mut bed.ctx(), &info).unwrap();

        match bed.stream.insts().last().unwrap() {
            Inst::CallFrameDestroy(destroy) => {
                assert_eq!(destroy.bytes, 144);
                assert!(destroy.scratch.is_some());
                assert!(destroy.clobbers_flags);
            }
            other => panic!("expected destroy marker, got {other:?}"),
        }
    }

    #[test]
    fn result_capture_defines_and_merges() {
        let mut bed = TestBed::new(testing::STD, false);
        let ret_value = bed.stream.create_value(I64);
        let mut info = call(&mut bed, testing::STD, 1);

        info.ret = Some(CallRet {
            value: ret_value,
            ty: AbiType::Aggregate(smallvec![I64, I64]),
        });

        lower_call(&mut bed.ctx(), &info).unwrap();

        let call_inst = bed
            .stream
            .insts()
            .iter()
            .find_map(|inst| match inst {
                Inst::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();

        assert_eq!(call_inst.defs.as_slice(), &[testing::R0, testing::R1]);

        // the logical result is rebuilt from the captured parts
        assert!(matches!(
            bed.stream.def_of(ret_value),
            Some(Inst::Merge(merge)) if merge.parts.len() == 2
        ));
    }

    #[test]
    fn aggregate_arguments_are_unmerged() {
        let mut bed = TestBed::new(testing::STD, false);
        let agg = bed.stream.create_value(I64);
        let mut info = call(&mut bed, testing::STD, 0);

        info.args.push(CallArg::new(
            agg,
            AbiType::Aggregate(smallvec![I64, Ty::int(32)]),
        ));

        lower_call(&mut bed.ctx(), &info).unwrap();

        assert_eq!(
            count_matching(&bed, |inst| matches!(inst, Inst::Unmerge(_))),
            1
        );

        let call_inst = bed
            .stream
            .insts()
            .iter()
            .find_map(|inst| match inst {
                Inst::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();

        assert_eq!(call_inst.uses.as_slice(), &[testing::R0, testing::R1]);
    }

    #[test]
    fn zero_sized_arguments_contribute_nothing() {
        let mut bed = TestBed::new(testing::STD, false);
        let empty = bed.stream.create_value(Ty::int(0));
        let mut info = call(&mut bed, testing::STD, 1);

        info.args.push(CallArg::new(empty, AbiType::Scalar(Ty::int(0))));

        lower_call(&mut bed.ctx(), &info).unwrap();

        let call_inst = bed
            .stream
            .insts()
            .iter()
            .find_map(|inst| match inst {
                Inst::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();

        assert_eq!(call_inst.uses.as_slice(), &[testing::R0]);
    }

    #[test]
    fn callee_chains_resolve_to_symbols() {
        let mut bed = TestBed::new(testing::STD, false);

        let addr = bed.stream.create_value(Ty::ptr(64));
        bed.stream.push(Inst::GlobalAddr(GlobalAddr {
            dst: addr,
            symbol: "target".into(),
        }));

        let copied = bed.stream.create_value(Ty::ptr(64));
        bed.stream.push(Inst::Move(Move {
            dst: Loc::Val(copied),
            src: Loc::Val(addr),
        }));

        let mut info = call(&mut bed, testing::STD, 0);
        info.callee = CalleeOperand::Reg(copied);

        lower_call(&mut bed.ctx(), &info).unwrap();

        let call_inst = bed
            .stream
            .insts()
            .iter()
            .find_map(|inst| match inst {
                Inst::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();

        assert_eq!(call_inst.callee, CalleeOperand::Symbol("target".into()));
    }

    #[test]
    fn sibling_tail_call_reuses_frame_in_place() {
        let mut bed = TestBed::new(testing::STD, false);
        bed.func.set_incoming_arg_bytes(64);

        // 8 args: 40 outgoing stack bytes within the 64-byte incoming area
        let mut info = call(&mut bed, testing::STD, 8);
        info.tail_call = true;

        let outcome = lower_call(&mut bed.ctx(), &info).unwrap();
        assert_eq!(outcome, LoweredCall::Tail);

        assert_eq!(count_matching(&bed, |inst| matches!(inst, Inst::Call(_))), 0);
        assert_eq!(
            count_matching(&bed, |inst| matches!(
                inst,
                Inst::CallFrameSetup(_) | Inst::CallFrameDestroy(_)
            )),
            0
        );

        match bed.stream.insts().last().unwrap() {
            Inst::TailReturn(tail) => {
                assert_eq!(tail.frame_delta, None);
                assert_eq!(tail.uses.as_slice(), &[testing::R0, testing::R1, testing::R2]);
            }
            other => panic!("expected tail return, got {other:?}"),
        }

        // argument stores target the caller's own area: delta zero
        assert_eq!(
            bed.frame.fixed,
            vec![(8, 0), (8, 8), (8, 16), (8, 24), (8, 32)]
        );
        assert!(bed.frame.has_tail_call);
    }

    #[test]
    fn oversized_outgoing_args_fall_back_to_normal_call() {
        let mut bed = TestBed::new(testing::STD, false);
        bed.func.set_incoming_arg_bytes(64);

        // 13 args: 80 outgoing stack bytes exceed the 64-byte incoming area
        let mut info = call(&mut bed, testing::STD, 13);
        info.tail_call = true;

        let outcome = lower_call(&mut bed.ctx(), &info).unwrap();
        assert_eq!(outcome, LoweredCall::Normal);

        assert_eq!(count_matching(&bed, |inst| matches!(inst, Inst::Call(_))), 1);
        assert_eq!(
            count_matching(&bed, |inst| matches!(inst, Inst::TailReturn(_))),
            0
        );
        assert!(!bed.frame.has_tail_call);
    }

    #[test]
    fn variadic_tail_call_with_stack_argument_downgrades() {
        let mut bed = TestBed::new(testing::STD, false);
        bed.func.set_incoming_arg_bytes(64);

        let mut info = call(&mut bed, testing::STD, 4);
        info.tail_call = true;
        info.variadic = true;

        // plenty of room, still not a tail call
        let outcome = lower_call(&mut bed.ctx(), &info).unwrap();
        assert_eq!(outcome, LoweredCall::Normal);
    }

    #[test]
    fn mandatory_tail_call_failure_is_an_error() {
        let mut bed = TestBed::new(testing::STD, false);
        bed.func.set_incoming_arg_bytes(64);

        let mut info = call(&mut bed, testing::STD, 13);
        info.tail_call = true;
        info.must_tail = true;

        assert!(matches!(
            lower_call(&mut bed.ctx(), &info),
            Err(LowerError::MandatoryTailCall)
        ));
    }

    #[test]
    fn guaranteed_tco_grows_the_frame_by_delta() {
        let mut bed = TestBed::new(testing::FAST, false);
        bed.options.guaranteed_tail_calls = true;
        bed.func.set_incoming_arg_bytes(64);

        // 6 args under FAST: 4 in registers, 16 outgoing stack bytes
        let mut info = call(&mut bed, testing::FAST, 6);
        info.tail_call = true;

        let outcome = lower_call(&mut bed.ctx(), &info).unwrap();
        assert_eq!(outcome, LoweredCall::Tail);

        // delta = 64 incoming - 16 outgoing
        match bed.stream.insts().last().unwrap() {
            Inst::TailReturn(tail) => assert_eq!(tail.frame_delta, Some(48)),
            other => panic!("expected tail return, got {other:?}"),
        }

        // stores land in the callee's eventual layout, offset by the delta
        assert_eq!(bed.frame.fixed, vec![(8, 48), (8, 56)]);

        // both markers close before the tail-return itself
        let insts = bed.stream.insts();
        assert!(matches!(insts[0], Inst::CallFrameSetup(CallFrameSetup { bytes: 16, .. })));
        assert!(matches!(
            insts[insts.len() - 2],
            Inst::CallFrameDestroy(CallFrameDestroy { bytes: 16, .. })
        ));
        assert!(bed.frame.has_tail_call);
    }

    #[test]
    fn bti_rejects_indirect_tail_calls() {
        let mut bed = TestBed::new(testing::STD, false);
        bed.options.branch_target_enforcement = true;
        bed.func.set_incoming_arg_bytes(64);

        let target = bed.stream.create_value(Ty::ptr(64));
        let mut info = call(&mut bed, testing::STD, 2);
        info.callee = CalleeOperand::Reg(target);
        info.tail_call = true;

        assert!(matches!(
            lower_call(&mut bed.ctx(), &info),
            Err(LowerError::BranchTargetEnforcement)
        ));
    }

    #[test]
    fn unclassifiable_arguments_fail_cleanly() {
        let mut bed = TestBed::new(testing::STD, false);
        let wide = bed.stream.create_value(Ty::int(256));
        let mut info = call(&mut bed, testing::STD, 0);

        info.args.push(CallArg::new(wide, AbiType::Scalar(Ty::int(256))));

        assert!(matches!(
            lower_call(&mut bed.ctx(), &info),
            Err(LowerError::Classify(_))
        ));
    }

    #[test]
    fn variadic_multi_part_arguments_are_unsupported() {
        let mut bed = TestBed::new(testing::STD, false);
        let agg = bed.stream.create_value(I64);
        let mut info = call(&mut bed, testing::STD, 0);

        info.variadic = true;
        info.args
            .push(CallArg::new(agg, AbiType::Aggregate(smallvec![I64, I64])));

        assert!(matches!(
            lower_call(&mut bed.ctx(), &info),
            Err(LowerError::MultiPartValue { .. })
        ));
    }

    #[test]
    fn fixed_convention_value_rides_along_with_calls() {
        let mut bed = TestBed::new(testing::STD, false);
        let info = call(&mut bed, testing::FLAGS, 1);

        lower_call(&mut bed.ctx(), &info).unwrap();

        let call_inst = bed
            .stream
            .insts()
            .iter()
            .find_map(|inst| match inst {
                Inst::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();

        assert!(call_inst.uses.contains(&testing::FLAGS_WORD_REG));
    }
}
