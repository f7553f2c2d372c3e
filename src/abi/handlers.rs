//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The value handlers: the strategies that materialize one classified slot
//! assignment into actual machine operations.
//!
//! Classification (which slot a part gets) is entirely the target's
//! business; handlers only decide *how* a value reaches its slot. Four
//! strategies exist — outgoing call arguments, outgoing tail-call
//! arguments, incoming formal parameters, and incoming call results — plus
//! the plain outgoing handler that return lowering drives directly. Keeping
//! the two concerns apart lets one classification serve all five without
//! duplicating any placement rule.
//!
//! Outgoing handlers buffer their instructions locally and splice them into
//! the stream at finalization. The call-argument handler buffers *two*
//! lists: register copies and direct stores accumulate in assignment order,
//! while pushes accumulate separately and are spliced immediately before
//! the call in reverse assignment order, so the lowest-offset slot is
//! pushed last and lands at the stack pointer.

use crate::abi::{ConventionId, LowerCtx, Part, Slot, SlotAssignment, TargetAbi};
use crate::frame::{FrameLayout, FrameState};
use crate::mir::{
    AnyExt, Constant, FrameAddr, Inst, Load, Loc, Move, PReg, Push, PtrAdd, Store, Ty, Value,
};
use smallvec::SmallVec;

/// A strategy for materializing classified slot assignments.
///
/// [`drive_assignments`] walks a part/slot sequence and dispatches each
/// entry here, then finalizes the handler exactly once.
pub(crate) trait SlotSink {
    /// Materializes `value` into the physical register `reg`.
    fn assign_to_reg(&mut self, ctx: &mut LowerCtx<'_>, value: Value, reg: PReg);

    /// Materializes `value` (a part of type `ty`) into the stack slot at
    /// `offset` of `size` bytes.
    fn assign_to_stack(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        value: Value,
        ty: Ty,
        offset: i64,
        size: u64,
    );

    /// Runs once after every slot has been assigned.
    fn finalize(&mut self, ctx: &mut LowerCtx<'_>, conv: ConventionId, assignment: &SlotAssignment);
}

/// Drives one classified assignment through `sink`, then finalizes it.
///
/// The part and slot sequences are parallel by construction; a mismatch
/// means classification broke its contract and is a fatal programming
/// error, not a recoverable lowering failure.
pub(crate) fn drive_assignments(
    sink: &mut dyn SlotSink,
    ctx: &mut LowerCtx<'_>,
    conv: ConventionId,
    parts: &[Part],
    assignment: &SlotAssignment,
) {
    assert_eq!(
        parts.len(),
        assignment.slots.len(),
        "classification produced a slot count different from the part count"
    );

    for (part, slot) in parts.iter().zip(assignment.slots.iter()) {
        match *slot {
            Slot::Reg(reg) => sink.assign_to_reg(ctx, part.value, reg),
            Slot::Stack { offset, size } => {
                sink.assign_to_stack(ctx, part.value, part.ty, offset, size)
            }
        }
    }

    sink.finalize(ctx, conv, assignment);
}

/// A scratch snapshot of the stack pointer taken at handler construction,
/// used as the base for stack-pointer-relative stores.
///
/// If no stack address is ever taken the snapshot is deleted again at
/// finalization, so all-register assignments emit no trace of it.
struct SpSnapshot {
    value: Value,
    buf_index: usize,
    used: bool,
}

impl SpSnapshot {
    fn take(ctx: &mut LowerCtx<'_>, buf: &mut Vec<Inst>) -> Self {
        let value = ctx.stream.create_value(ctx.abi.ptr_ty());
        let buf_index = buf.len();

        buf.push(Inst::Move(Move {
            dst: Loc::Val(value),
            src: Loc::Phys(ctx.abi.stack_pointer()),
        }));

        Self {
            value,
            buf_index,
            used: false,
        }
    }

    /// Materializes `snapshot + offset` into `buf`, returning the address
    /// value.
    fn address(&mut self, ctx: &mut LowerCtx<'_>, buf: &mut Vec<Inst>, offset: i64) -> Value {
        self.used = true;

        let off = ctx.stream.create_value(Ty::int(ctx.abi.ptr_ty().bits()));
        buf.push(Inst::Constant(Constant { dst: off, value: offset }));

        let addr = ctx.stream.create_value(ctx.abi.ptr_ty());
        buf.push(Inst::PtrAdd(PtrAdd {
            dst: addr,
            base: self.value,
            offset: off,
        }));

        addr
    }

    fn cleanup(&self, buf: &mut Vec<Inst>) {
        if !self.used {
            buf.remove(self.buf_index);
        }
    }
}

/// The plain outgoing handler: emits a register copy or a direct
/// stack-pointer-relative store per slot. Return lowering drives this
/// directly; the call and tail-call handlers specialize the stack path.
pub(crate) struct OutgoingValueHandler {
    buf: Vec<Inst>,
    sp: SpSnapshot,
    uses: SmallVec<[PReg; 4]>,
    frame: FrameState,
}

impl OutgoingValueHandler {
    pub(crate) fn new(ctx: &mut LowerCtx<'_>) -> Self {
        let mut buf = Vec::new();
        let sp = SpSnapshot::take(ctx, &mut buf);

        Self {
            buf,
            sp,
            uses: SmallVec::new(),
            frame: FrameState::default(),
        }
    }

    /// The registers assigned so far, to attach as implicit uses of the
    /// pending return instruction.
    pub(crate) fn take_uses(&mut self) -> SmallVec<[PReg; 4]> {
        std::mem::take(&mut self.uses)
    }

    pub(crate) fn frame_state(&self) -> FrameState {
        self.frame
    }
}

impl SlotSink for OutgoingValueHandler {
    fn assign_to_reg(&mut self, _: &mut LowerCtx<'_>, value: Value, reg: PReg) {
        self.uses.push(reg);
        self.buf.push(Inst::Move(Move {
            dst: Loc::Phys(reg),
            src: Loc::Val(value),
        }));
    }

    fn assign_to_stack(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        value: Value,
        ty: Ty,
        offset: i64,
        _: u64,
    ) {
        let addr = self.sp.address(ctx, &mut self.buf, offset);

        self.buf.push(Inst::Store(Store {
            src: value,
            addr,
            ty,
        }));
    }

    fn finalize(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        conv: ConventionId,
        assignment: &SlotAssignment,
    ) {
        self.frame.committed_bytes = assignment.stack_bytes;

        if let Some(fixed) = ctx.abi.fixed_convention_value(conv) {
            let constant = ctx.stream.create_value(fixed.ty);

            self.buf.push(Inst::Constant(Constant {
                dst: constant,
                value: fixed.value,
            }));
            self.assign_to_reg(ctx, constant, fixed.reg);
        }

        self.sp.cleanup(&mut self.buf);
        ctx.stream.extend(self.buf.drain(..));
    }
}

/// The outgoing handler for ordinary calls.
///
/// Stack slots whose rounded size is exactly one stack unit, and whose
/// offset is exactly the bytes already contributed by pushes, are emitted
/// as pushes; the running total of pushed bytes is the sequence's *setup
/// adjustment*. Everything else falls back to a direct store, rebased by
/// the setup adjustment because the stack-pointer snapshot will sit that
/// many bytes above the final argument area.
pub(crate) struct CallArgHandler {
    setup: Vec<Inst>,
    pushes: Vec<SmallVec<[Inst; 2]>>,
    sp: SpSnapshot,
    uses: SmallVec<[PReg; 4]>,
    frame: FrameState,
}

impl CallArgHandler {
    pub(crate) fn new(ctx: &mut LowerCtx<'_>) -> Self {
        let mut setup = Vec::new();
        let sp = SpSnapshot::take(ctx, &mut setup);

        Self {
            setup,
            pushes: Vec::new(),
            sp,
            uses: SmallVec::new(),
            frame: FrameState::default(),
        }
    }

    /// The registers assigned so far, to attach as implicit uses of the
    /// pending call instruction.
    pub(crate) fn take_uses(&mut self) -> SmallVec<[PReg; 4]> {
        std::mem::take(&mut self.uses)
    }

    pub(crate) fn frame_state(&self) -> FrameState {
        self.frame
    }
}

impl SlotSink for CallArgHandler {
    fn assign_to_reg(&mut self, _: &mut LowerCtx<'_>, value: Value, reg: PReg) {
        self.uses.push(reg);
        self.setup.push(Inst::Move(Move {
            dst: Loc::Phys(reg),
            src: Loc::Val(value),
        }));
    }

    fn assign_to_stack(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        value: Value,
        ty: Ty,
        offset: i64,
        size: u64,
    ) {
        let unit = ctx.abi.stack_unit();

        if size == unit && offset as u64 == self.frame.setup_adjust {
            // the slot sits exactly at the frontier of what pushes have
            // covered, so one more push lands it correctly
            let mut group = SmallVec::new();

            let src = if ty.bytes() < unit {
                let wide = ctx.stream.create_value(Ty::int((unit * 8) as u32));

                group.push(Inst::AnyExt(AnyExt { dst: wide, src: value }));

                wide
            } else {
                value
            };

            group.push(Inst::Push(Push { src }));
            self.pushes.push(group);
            self.frame.setup_adjust += unit;
        } else {
            let rebased = offset - self.frame.setup_adjust as i64;
            let addr = self.sp.address(ctx, &mut self.setup, rebased);

            self.setup.push(Inst::Store(Store {
                src: value,
                addr,
                ty,
            }));
        }
    }

    fn finalize(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        conv: ConventionId,
        assignment: &SlotAssignment,
    ) {
        self.frame.committed_bytes = assignment.stack_bytes;

        if let Some(fixed) = ctx.abi.fixed_convention_value(conv) {
            let constant = ctx.stream.create_value(fixed.ty);

            self.setup.push(Inst::Constant(Constant {
                dst: constant,
                value: fixed.value,
            }));
            self.assign_to_reg(ctx, constant, fixed.reg);
        }

        self.sp.cleanup(&mut self.setup);
        ctx.stream.extend(self.setup.drain(..));

        // pushes run in reverse assignment order: the slot at offset zero
        // is pushed last, directly below everything already pushed
        for group in std::mem::take(&mut self.pushes).into_iter().rev() {
            ctx.stream.extend(group);
        }
    }
}

/// The outgoing handler for tail calls.
///
/// Tail-call arguments must land in the callee's *eventual* frame layout
/// rather than the caller's current one, so every stack slot becomes a
/// fixed frame object at `frame_delta + offset` and is stored through its
/// frame address.
pub(crate) struct TailCallArgHandler {
    buf: Vec<Inst>,
    uses: SmallVec<[PReg; 4]>,
    frame: FrameState,
}

impl TailCallArgHandler {
    pub(crate) fn new(frame_delta: i64) -> Self {
        Self {
            buf: Vec::new(),
            uses: SmallVec::new(),
            frame: FrameState {
                frame_delta,
                ..FrameState::default()
            },
        }
    }

    /// The registers assigned so far, to attach as implicit uses of the
    /// pending tail-return instruction.
    pub(crate) fn take_uses(&mut self) -> SmallVec<[PReg; 4]> {
        std::mem::take(&mut self.uses)
    }

    pub(crate) fn frame_state(&self) -> FrameState {
        self.frame
    }
}

impl SlotSink for TailCallArgHandler {
    fn assign_to_reg(&mut self, _: &mut LowerCtx<'_>, value: Value, reg: PReg) {
        self.uses.push(reg);
        self.buf.push(Inst::Move(Move {
            dst: Loc::Phys(reg),
            src: Loc::Val(value),
        }));
    }

    fn assign_to_stack(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        value: Value,
        ty: Ty,
        offset: i64,
        size: u64,
    ) {
        let index = ctx
            .frame
            .create_fixed_stack_slot(size, self.frame.frame_delta + offset);
        let addr = ctx.stream.create_value(ctx.abi.ptr_ty());

        self.buf.push(Inst::FrameAddr(FrameAddr { dst: addr, index }));
        self.buf.push(Inst::Store(Store {
            src: value,
            addr,
            ty,
        }));
    }

    fn finalize(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        conv: ConventionId,
        assignment: &SlotAssignment,
    ) {
        self.frame.committed_bytes = assignment.stack_bytes;

        if let Some(fixed) = ctx.abi.fixed_convention_value(conv) {
            let constant = ctx.stream.create_value(fixed.ty);

            self.buf.push(Inst::Constant(Constant {
                dst: constant,
                value: fixed.value,
            }));
            self.assign_to_reg(ctx, constant, fixed.reg);
        }

        ctx.stream.extend(self.buf.drain(..));
    }
}

/// The incoming handler for formal parameters: binds each slot to the
/// parameter's live-in location at function entry.
pub(crate) struct FormalArgHandler;

impl SlotSink for FormalArgHandler {
    fn assign_to_reg(&mut self, ctx: &mut LowerCtx<'_>, value: Value, reg: PReg) {
        ctx.stream.add_live_in(reg);
        ctx.stream.push(Inst::Move(Move {
            dst: Loc::Val(value),
            src: Loc::Phys(reg),
        }));
    }

    fn assign_to_stack(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        value: Value,
        ty: Ty,
        offset: i64,
        size: u64,
    ) {
        let index = ctx.frame.create_fixed_stack_slot(size, offset);
        let addr = ctx.stream.create_value(ctx.abi.ptr_ty());

        ctx.stream.push(Inst::FrameAddr(FrameAddr { dst: addr, index }));
        ctx.stream.push(Inst::Load(Load {
            dst: value,
            addr,
            ty,
        }));
    }

    fn finalize(&mut self, ctx: &mut LowerCtx<'_>, _: ConventionId, assignment: &SlotAssignment) {
        ctx.func.set_incoming_arg_bytes(assignment.stack_bytes);

        if ctx.func.variadic() {
            // the variadic area begins where the named arguments end
            let slot = ctx
                .frame
                .create_fixed_stack_slot(1, assignment.stack_bytes as i64);

            ctx.func.set_variadic_slot(slot);
        }
    }
}

/// The incoming handler for call results: binds each slot to the result
/// registers of an already emitted call instruction.
///
/// The distinction from [`FormalArgHandler`] is what "this register is
/// used" means: a formal parameter's register is a function live-in, while
/// a call result's register is an implicit def of the call.
pub(crate) struct CallReturnHandler {
    call_idx: usize,
}

impl CallReturnHandler {
    pub(crate) fn new(call_idx: usize) -> Self {
        Self { call_idx }
    }
}

impl SlotSink for CallReturnHandler {
    fn assign_to_reg(&mut self, ctx: &mut LowerCtx<'_>, value: Value, reg: PReg) {
        ctx.stream.append_implicit_def(self.call_idx, reg);
        ctx.stream.push(Inst::Move(Move {
            dst: Loc::Val(value),
            src: Loc::Phys(reg),
        }));
    }

    fn assign_to_stack(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        value: Value,
        ty: Ty,
        offset: i64,
        size: u64,
    ) {
        let index = ctx.frame.create_fixed_stack_slot(size, offset);
        let addr = ctx.stream.create_value(ctx.abi.ptr_ty());

        ctx.stream.push(Inst::FrameAddr(FrameAddr { dst: addr, index }));
        ctx.stream.push(Inst::Load(Load {
            dst: value,
            addr,
            ty,
        }));
    }

    fn finalize(&mut self, _: &mut LowerCtx<'_>, _: ConventionId, _: &SlotAssignment) {}
}
