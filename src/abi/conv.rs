//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::mir::{AbiType, PReg, Ty, Value};
use smallbitvec::SmallBitVec;
use thiserror::Error;

/// Identifies one named calling convention known to the target.
///
/// The lowering engine never interprets the id, it only threads it through
/// to the [`TargetAbi`] and compares ids for equality.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConventionId(pub u32);

/// A set of physical registers that are preserved across a call, one bit
/// per [`PReg::identity`].
#[derive(Clone, PartialEq, Debug, Default)]
pub struct RegMask {
    bits: SmallBitVec,
}

impl RegMask {
    /// Creates a mask preserving exactly the registers in `regs`.
    pub fn preserving(regs: &[PReg]) -> Self {
        let len = regs.iter().map(|reg| reg.identity() + 1).max().unwrap_or(0);
        let mut bits = SmallBitVec::from_elem(len, false);

        for reg in regs {
            bits.set(reg.identity(), true);
        }

        Self { bits }
    }

    /// Checks whether `reg` is preserved across a call.
    #[inline]
    pub fn preserves(&self, reg: PReg) -> bool {
        self.bits.get(reg.identity()).unwrap_or(false)
    }

    /// Checks whether every register preserved by `self` is also preserved
    /// by `other`.
    pub fn is_subset_of(&self, other: &RegMask) -> bool {
        (0..self.bits.len())
            .filter(|&i| self.bits.get(i).unwrap_or(false))
            .all(|i| other.bits.get(i).unwrap_or(false))
    }
}

/// The location assigned to one scalar value part by classification.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Slot {
    /// The part lives in a physical register
    Reg(PReg),
    /// The part lives in the outgoing argument area
    Stack {
        /// Byte offset from the bottom of the argument area
        offset: i64,
        /// Slot size: the part's size rounded up to the convention's
        /// minimum stack unit
        size: u64,
    },
}

impl Slot {
    /// Checks whether the slot is a register.
    #[inline]
    pub fn is_reg(self) -> bool {
        matches!(self, Slot::Reg(_))
    }

    /// Checks whether the slot is in the argument area.
    #[inline]
    pub fn is_stack(self) -> bool {
        matches!(self, Slot::Stack { .. })
    }
}

/// ABI-relevant attributes attached to one argument or return value.
#[derive(Copy, Clone, Eq, PartialEq, Default, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArgFlags {
    /// The value is passed by pointer into caller-owned memory
    pub by_ref: bool,
    /// The value is a hidden struct-return pointer
    pub sret: bool,
    /// The value demands a specific register (forced-register placement)
    pub in_reg: bool,
    /// The value carries indirect-error plumbing across the call
    pub error_indirect: bool,
    /// The value is a sentinel argument with its own placement protocol
    pub nest: bool,
}

impl ArgFlags {
    /// Checks whether any flag incompatible with reusing the caller's
    /// argument area is set. A function with such a parameter can never be
    /// the *source* of a tail call.
    #[inline]
    pub fn blocks_frame_reuse(self) -> bool {
        self.by_ref || self.in_reg || self.error_indirect
    }
}

/// One scalar part of a logical argument or return value, ready for
/// classification.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Part {
    /// The value holding the part
    pub value: Value,
    /// The part's primitive type
    pub ty: Ty,
    /// The logical value's ABI attributes, shared by all of its parts
    pub flags: ArgFlags,
}

/// The result of classifying a part sequence under one convention: a slot
/// per part, plus the cumulative stack byte count for the whole sequence.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SlotAssignment {
    /// One slot per classified part, in part order
    pub slots: Vec<Slot>,
    /// Total bytes of stack consumed by the stack slots above
    pub stack_bytes: u64,
}

/// A convention-mandated constant that must be materialized into a fixed
/// register alongside the normal arguments (for conventions that smuggle an
/// environment word through a reserved register).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FixedConventionValue {
    /// The register the constant must land in
    pub reg: PReg,
    /// The constant itself
    pub value: i64,
    /// The constant's type
    pub ty: Ty,
}

/// A declared parameter or return of a function signature, as the ABI
/// boundary sees it.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AbiParam {
    /// The logical type
    pub ty: AbiType,
    /// ABI attributes
    pub flags: ArgFlags,
}

impl AbiParam {
    /// Creates a parameter with no attributes.
    pub fn new(ty: AbiType) -> Self {
        Self {
            ty,
            flags: ArgFlags::default(),
        }
    }
}

/// A function signature at the ABI level: the information call lowering
/// needs about a function it is lowering *into* (its own parameters and
/// return), as opposed to a call site it is lowering *from*.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Signature {
    /// The function's calling convention
    pub conv: ConventionId,
    /// The declared parameters, in order
    pub params: Vec<AbiParam>,
    /// The declared return type, if any
    pub ret: Option<AbiType>,
    /// Whether the function accepts variadic arguments
    pub variadic: bool,
}

/// The error produced when a part sequence cannot be classified.
///
/// Classification failure is a clean, recoverable condition: lowering
/// aborts and the caller retries with a non-optimizing fallback strategy.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The convention has no rule placing a part of this type.
    #[error("convention {conv:?} cannot place a value of type {ty:?}")]
    Unplaceable {
        /// The convention consulted
        conv: ConventionId,
        /// The part type with no placement rule
        ty: Ty,
    },

    /// The convention id is unknown to the target.
    #[error("convention {conv:?} is unknown to this target")]
    UnknownConvention {
        /// The unknown id
        conv: ConventionId,
    },
}

/// The target's ABI description: the calling-convention classification
/// tables plus the per-convention metadata the lowering engine consults.
///
/// Implementations are consumed, never built, by this crate. The two
/// classification entry points must be *convention-deterministic*: identical
/// part sequences under the same convention id always yield identical slot
/// sequences. Tail-call compatibility analysis classifies the same values
/// repeatedly and compares the results, so a nondeterministic table would
/// make unsound calls look compatible.
///
/// Slot sequences must also place stack slots at monotonically
/// non-decreasing offsets in part order, with every slot size rounded up to
/// [`stack_unit`](TargetAbi::stack_unit) bytes.
pub trait TargetAbi {
    /// Classifies outgoing or incoming *argument* parts under `conv`.
    fn classify_args(
        &self,
        conv: ConventionId,
        parts: &[Part],
        variadic: bool,
    ) -> Result<SlotAssignment, ClassifyError>;

    /// Classifies *return value* parts under `conv`. Conventions commonly
    /// use a different table for results than for arguments.
    fn classify_rets(
        &self,
        conv: ConventionId,
        parts: &[Part],
        variadic: bool,
    ) -> Result<SlotAssignment, ClassifyError>;

    /// The registers a call under `conv` preserves.
    fn preserved_mask(&self, conv: ConventionId) -> RegMask;

    /// Whether calls under `conv` may ever be lowered as tail calls.
    fn may_tail_call(&self, conv: ConventionId) -> bool;

    /// Whether `conv` guarantees tail-call-optimization semantics: the
    /// stricter subset of [`may_tail_call`](TargetAbi::may_tail_call)
    /// conventions whose calls can be mechanically *guaranteed*, not merely
    /// permitted, to be tail calls.
    fn guarantees_tco(&self, conv: ConventionId) -> bool;

    /// A constant `conv` requires in a fixed register for every call,
    /// expressed outside the normal argument list.
    fn fixed_convention_value(&self, conv: ConventionId) -> Option<FixedConventionValue> {
        let _ = conv;

        None
    }

    /// The convention-independent minimum stack slot size, which is also
    /// the width of a push.
    fn stack_unit(&self) -> u64;

    /// The target's pointer type.
    fn ptr_ty(&self) -> Ty;

    /// The stack-pointer register.
    fn stack_pointer(&self) -> PReg;
}
