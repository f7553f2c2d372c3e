//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Interfaces to the target's frame-layout engine and stack-adjustment cost
//! oracle, plus the per-function ABI state that call lowering records for
//! them to read.

use crate::abi::{ArgFlags, ConventionId, Signature};
use crate::mir::Value;
use smallvec::SmallVec;

/// A reference to one fixed stack object created by the frame-layout
/// engine.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameIdx(u32);

impl FrameIdx {
    /// Creates a frame index. Only frame-layout engines should mint these.
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// The index of the frame object, usable as an array key.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The subset of the target's frame-layout engine that call lowering
/// drives. The full engine (prologue/epilogue shape, frame finalization)
/// lives in the surrounding code generator.
pub trait FrameLayout {
    /// Creates a fixed stack object of `size` bytes at `offset` within the
    /// function's incoming-or-outgoing argument area.
    fn create_fixed_stack_slot(&mut self, size: u64, offset: i64) -> FrameIdx;

    /// Records that the function contains a tail call, which constrains how
    /// its own prologue and epilogue may be shaped.
    fn mark_has_tail_call(&mut self);
}

/// Per-function ABI state. Call lowering both reads and writes this: the
/// formal-argument path records the function's own incoming argument area,
/// and later tail-call analysis of calls *inside* the function compares
/// callee argument areas against it.
///
/// This is the only state that persists across individual call lowerings.
#[derive(Clone, Debug)]
pub struct FunctionAbi {
    conv: ConventionId,
    variadic: bool,
    param_flags: SmallVec<[ArgFlags; 8]>,
    incoming_arg_bytes: Option<u64>,
    sret_value: Option<Value>,
    variadic_slot: Option<FrameIdx>,
}

impl FunctionAbi {
    /// Creates the ABI state for a function with no interesting parameter
    /// attributes.
    pub fn new(conv: ConventionId, variadic: bool) -> Self {
        Self {
            conv,
            variadic,
            param_flags: SmallVec::new(),
            incoming_arg_bytes: None,
            sret_value: None,
            variadic_slot: None,
        }
    }

    /// Creates the ABI state for a function with the given signature.
    pub fn from_signature(sig: &Signature) -> Self {
        Self {
            conv: sig.conv,
            variadic: sig.variadic,
            param_flags: sig.params.iter().map(|param| param.flags).collect(),
            incoming_arg_bytes: None,
            sret_value: None,
            variadic_slot: None,
        }
    }

    /// The function's own calling convention.
    #[inline]
    pub fn conv(&self) -> ConventionId {
        self.conv
    }

    /// Whether the function is variadic.
    #[inline]
    pub fn variadic(&self) -> bool {
        self.variadic
    }

    /// The ABI attributes of every declared parameter, in order.
    #[inline]
    pub fn param_flags(&self) -> &[ArgFlags] {
        &self.param_flags
    }

    /// The byte size of the function's own incoming argument area, once
    /// formal-argument lowering has recorded it.
    #[inline]
    pub fn incoming_arg_bytes(&self) -> Option<u64> {
        self.incoming_arg_bytes
    }

    /// The value bound to the hidden struct-return pointer parameter, if
    /// the function has one and the return-sret policy is active.
    #[inline]
    pub fn sret_value(&self) -> Option<Value> {
        self.sret_value
    }

    /// The frame object marking where variadic arguments begin, for
    /// variadic functions.
    #[inline]
    pub fn variadic_slot(&self) -> Option<FrameIdx> {
        self.variadic_slot
    }

    pub(crate) fn set_param_flags(&mut self, flags: impl IntoIterator<Item = ArgFlags>) {
        self.param_flags = flags.into_iter().collect();
    }

    pub(crate) fn set_incoming_arg_bytes(&mut self, bytes: u64) {
        self.incoming_arg_bytes = Some(bytes);
    }

    pub(crate) fn set_sret_value(&mut self, value: Value) {
        self.sret_value = Some(value);
    }

    pub(crate) fn set_variadic_slot(&mut self, slot: FrameIdx) {
        self.variadic_slot = Some(slot);
    }
}

/// Per-call-sequence frame bookkeeping, produced by the value handlers and
/// consumed by the call-frame markers. Scoped to exactly one call lowering.
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug)]
pub struct FrameState {
    /// Total bytes of outgoing argument area committed by the sequence
    pub committed_bytes: u64,
    /// The portion of `committed_bytes` emitted as pushes rather than
    /// direct stack stores
    pub setup_adjust: u64,
    /// For tail calls, the signed byte delta between the callee's argument
    /// area and the caller's own incoming argument area
    pub frame_delta: i64,
}

/// The strategies a target can use to adjust the stack pointer around a
/// call sequence, in roughly increasing order of the adjustment size each
/// is cheapest for.
///
/// Which strategy is cheapest for a given byte count is the cost oracle's
/// decision; what the lowering engine needs to know is only which scratch
/// state each strategy tramples, so the call-frame markers can declare it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum StackAdjustment {
    /// No adjustment needed
    None,
    /// A handful of single-unit adjustments
    Tiny,
    /// An adjustment through a scratch register
    Small,
    /// An adjustment through the accumulator
    Medium,
    /// An adjustment through the accumulator that also trashes flags
    Large,
    /// A full save/restore of the stack pointer
    All,
}

/// The scratch state a [`StackAdjustment`] strategy clobbers.
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug)]
pub struct AdjustmentClobbers {
    /// The strategy needs a general-purpose scratch register
    pub scratch: bool,
    /// The strategy clobbers the flags register
    pub flags: bool,
}

impl StackAdjustment {
    /// The scratch state this strategy clobbers.
    pub fn clobbers(self) -> AdjustmentClobbers {
        match self {
            StackAdjustment::None | StackAdjustment::Tiny | StackAdjustment::All => {
                AdjustmentClobbers::default()
            }
            StackAdjustment::Small | StackAdjustment::Medium => AdjustmentClobbers {
                scratch: true,
                flags: false,
            },
            StackAdjustment::Large => AdjustmentClobbers {
                scratch: true,
                flags: true,
            },
        }
    }
}

/// The target's stack-adjustment cost oracle.
///
/// Given the byte count a call-frame marker must adjust the stack pointer
/// by, the oracle picks the cheapest strategy. The lowering engine treats
/// the decision as a black box and only consumes the strategy's declared
/// clobbers.
pub trait AdjustmentOracle {
    /// The cheapest strategy for adjusting the stack pointer by `bytes`.
    fn cheapest(&self, bytes: u64) -> StackAdjustment;
}
