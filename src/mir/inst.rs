//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::abi::RegMask;
use crate::frame::FrameIdx;
use crate::mir::{PReg, Value};
use smallvec::SmallVec;
use static_assertions::assert_eq_size;

/// What kind of primitive machine type a [`Ty`] is.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TyKind {
    /// An integer of some bit-width
    Int = 0,
    /// A pointer, with the target's pointer bit-width
    Ptr = 1,
}

/// A primitive machine type: an integer or pointer of a known bit-width.
///
/// This is the type granularity that calling conventions operate on. A
/// zero-width integer is permitted and denotes a value with no storage.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ty {
    kind: TyKind,
    bits: u32,
}

impl Ty {
    /// Creates an integer type of `bits` bits.
    #[inline]
    pub const fn int(bits: u32) -> Self {
        Self {
            kind: TyKind::Int,
            bits,
        }
    }

    /// Creates a pointer type of `bits` bits.
    #[inline]
    pub const fn ptr(bits: u32) -> Self {
        Self {
            kind: TyKind::Ptr,
            bits,
        }
    }

    /// The width of the type in bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.bits
    }

    /// The number of bytes required to store a value of this type.
    #[inline]
    pub const fn bytes(self) -> u64 {
        (self.bits as u64).div_ceil(8)
    }

    /// Checks whether the type is a pointer.
    #[inline]
    pub const fn is_ptr(self) -> bool {
        matches!(self.kind, TyKind::Ptr)
    }
}

assert_eq_size!(Ty, u64);

/// The type of one logical argument or return value at the ABI boundary.
///
/// Scalars map to exactly one value part; aggregates are flattened into one
/// part per element before classification. An empty aggregate (or a
/// zero-width scalar) has no storage and contributes no parts at all.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AbiType {
    /// A single primitive value
    Scalar(Ty),
    /// An aggregate of primitive elements, flattened in memory order
    Aggregate(SmallVec<[Ty; 4]>),
}

impl AbiType {
    /// The number of bytes required to store a value of this type.
    pub fn bytes(&self) -> u64 {
        match self {
            AbiType::Scalar(ty) => ty.bytes(),
            AbiType::Aggregate(elems) => elems.iter().map(|ty| ty.bytes()).sum(),
        }
    }
}

/// A location an instruction operand can name: a virtual value or a
/// physical register.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Loc {
    /// A virtual value in the enclosing [`MachineStream`](crate::mir::MachineStream)
    Val(Value),
    /// A physical register
    Phys(PReg),
}

/// The callee operand of a call or tail-return instruction.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum CalleeOperand {
    /// A direct reference to a named symbol
    Symbol(String),
    /// An indirect target held in a virtual value
    Reg(Value),
    /// A known absolute address
    Imm(i64),
}

impl CalleeOperand {
    /// Checks whether the callee is an indirect (register) target.
    #[inline]
    pub fn is_reg(&self) -> bool {
        matches!(self, CalleeOperand::Reg(_))
    }
}

/// A copy between two locations (virtual or physical).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Move {
    /// The destination of the copy
    pub dst: Loc,
    /// The source of the copy
    pub src: Loc,
}

/// Materializes an integer constant into a value.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Constant {
    /// The defined value
    pub dst: Value,
    /// The constant
    pub value: i64,
}

/// Materializes the address of a global symbol into a value.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct GlobalAddr {
    /// The defined value
    pub dst: Value,
    /// The symbol whose address is taken
    pub symbol: String,
}

/// Reinterprets an integer value as a pointer.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IntToPtr {
    /// The defined pointer value
    pub dst: Value,
    /// The integer source
    pub src: Value,
}

/// Computes `base + offset` pointer arithmetic.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PtrAdd {
    /// The defined pointer value
    pub dst: Value,
    /// The base pointer
    pub base: Value,
    /// The byte offset to add
    pub offset: Value,
}

/// Extends a value to a wider type with undefined high bits.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AnyExt {
    /// The defined (wider) value
    pub dst: Value,
    /// The narrower source
    pub src: Value,
}

/// Loads a value of type `ty` from `addr`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Load {
    /// The defined value
    pub dst: Value,
    /// The address loaded from
    pub addr: Value,
    /// The type (and therefore width) of the access
    pub ty: Ty,
}

/// Stores `src` (of type `ty`) to `addr`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Store {
    /// The value stored
    pub src: Value,
    /// The address stored to
    pub addr: Value,
    /// The type (and therefore width) of the access
    pub ty: Ty,
}

/// Pushes a stack-unit-sized value onto the stack, growing it by one unit.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Push {
    /// The value pushed
    pub src: Value,
}

/// Materializes the address of a fixed frame object.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FrameAddr {
    /// The defined pointer value
    pub dst: Value,
    /// The frame object referenced
    pub index: FrameIdx,
}

/// Splits an aggregate value into its scalar parts.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Unmerge {
    /// The defined part values, in element order
    pub parts: SmallVec<[Value; 2]>,
    /// The aggregate being split
    pub src: Value,
}

/// Rebuilds an aggregate value from its scalar parts.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Merge {
    /// The defined aggregate value
    pub dst: Value,
    /// The part values, in element order
    pub parts: SmallVec<[Value; 2]>,
}

/// A call instruction.
///
/// Argument registers appear as implicit uses and result registers as
/// implicit defs, so that later phases can see the registers crossing the
/// call without understanding the convention that placed them.
#[derive(Clone, PartialEq, Debug)]
pub struct Call {
    /// The call target
    pub callee: CalleeOperand,
    /// The registers the callee preserves across the call
    pub preserved: RegMask,
    /// Implicit uses: physical registers carrying arguments
    pub uses: SmallVec<[PReg; 4]>,
    /// Implicit defs: physical registers carrying results
    pub defs: SmallVec<[PReg; 2]>,
}

/// A tail-return instruction: the fused call-plus-return that replaces a
/// call/return pair when a call is lowered as a tail call.
#[derive(Clone, PartialEq, Debug)]
pub struct TailReturn {
    /// The call target
    pub callee: CalleeOperand,
    /// The registers the callee preserves across the call
    pub preserved: RegMask,
    /// Implicit uses: physical registers carrying arguments
    pub uses: SmallVec<[PReg; 4]>,
    /// The signed byte delta between the callee's argument area and the
    /// caller's own incoming argument area. `None` for sibling calls, which
    /// reuse the caller's argument area in place.
    pub frame_delta: Option<i64>,
}

/// A return instruction. Result registers appear as implicit uses.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Ret {
    /// Implicit uses: physical registers carrying the return value
    pub uses: SmallVec<[PReg; 2]>,
}

/// Opens a call sequence, and records how the sequence's argument area is
/// produced so the frame-layout engine can materialize the cheapest
/// stack-pointer adjustment later.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CallFrameSetup {
    /// Total bytes of outgoing argument area committed by the sequence
    pub bytes: u64,
    /// The portion of `bytes` contributed by push-style emission rather
    /// than direct stack stores
    pub setup_adjust: u64,
    /// A scratch value the chosen adjustment strategy is allowed to clobber
    pub scratch: Option<Value>,
    /// Whether the chosen adjustment strategy clobbers the flags register
    pub clobbers_flags: bool,
}

/// Closes a call sequence. Carries the same bookkeeping as
/// [`CallFrameSetup`] so the two markers can be reconciled independently.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CallFrameDestroy {
    /// Total bytes of outgoing argument area being torn down
    pub bytes: u64,
    /// Bytes already reclaimed by the callee or by pop-style emission
    pub destroy_adjust: u64,
    /// A scratch value the chosen adjustment strategy is allowed to clobber
    pub scratch: Option<Value>,
    /// Whether the chosen adjustment strategy clobbers the flags register
    pub clobbers_flags: bool,
}

/// A single machine-level operation in a lowered call sequence.
#[derive(Clone, PartialEq, Debug)]
pub enum Inst {
    /// A copy between two locations
    Move(Move),
    /// Materializes an integer constant
    Constant(Constant),
    /// Materializes a global symbol's address
    GlobalAddr(GlobalAddr),
    /// Reinterprets an integer as a pointer
    IntToPtr(IntToPtr),
    /// Pointer arithmetic
    PtrAdd(PtrAdd),
    /// Widens a value with undefined high bits
    AnyExt(AnyExt),
    /// A load from memory
    Load(Load),
    /// A store to memory
    Store(Store),
    /// A stack push
    Push(Push),
    /// The address of a fixed frame object
    FrameAddr(FrameAddr),
    /// Splits an aggregate into parts
    Unmerge(Unmerge),
    /// Rebuilds an aggregate from parts
    Merge(Merge),
    /// A call
    Call(Call),
    /// A fused call-plus-return
    TailReturn(TailReturn),
    /// A return
    Ret(Ret),
    /// Opens a call sequence
    CallFrameSetup(CallFrameSetup),
    /// Closes a call sequence
    CallFrameDestroy(CallFrameDestroy),
}

impl Inst {
    /// Returns every value this instruction defines.
    pub fn defs(&self) -> SmallVec<[Value; 2]> {
        let mut defs = SmallVec::new();

        match self {
            Inst::Move(Move {
                dst: Loc::Val(dst), ..
            }) => defs.push(*dst),
            Inst::Move(_) => {}
            Inst::Constant(inst) => defs.push(inst.dst),
            Inst::GlobalAddr(inst) => defs.push(inst.dst),
            Inst::IntToPtr(inst) => defs.push(inst.dst),
            Inst::PtrAdd(inst) => defs.push(inst.dst),
            Inst::AnyExt(inst) => defs.push(inst.dst),
            Inst::Load(inst) => defs.push(inst.dst),
            Inst::FrameAddr(inst) => defs.push(inst.dst),
            Inst::Unmerge(inst) => defs.extend(inst.parts.iter().copied()),
            Inst::Merge(inst) => defs.push(inst.dst),
            Inst::CallFrameSetup(inst) => defs.extend(inst.scratch),
            Inst::CallFrameDestroy(inst) => defs.extend(inst.scratch),
            Inst::Store(_)
            | Inst::Push(_)
            | Inst::Call(_)
            | Inst::TailReturn(_)
            | Inst::Ret(_) => {}
        }

        defs
    }
}
