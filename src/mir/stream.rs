//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::mir::{Inst, Loc, Move, PReg, Ty};
use crate::utility::SaHashMap;
use smallvec::SmallVec;
use static_assertions::assert_eq_size;

/// A virtual value produced by an instruction in a [`MachineStream`].
///
/// Values obey the usual SSA discipline within a stream: each value has at
/// most one defining instruction, and a definition always precedes its uses.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Value {
    data: u32,
}

impl Value {
    pub(crate) const fn new(index: usize) -> Self {
        Self { data: index as u32 }
    }

    /// The index of the value, usable as an array key.
    #[inline]
    pub const fn index(self) -> usize {
        self.data as usize
    }
}

assert_eq_size!(Value, u32);

/// One linear, append-only sequence of machine instructions being lowered
/// into, together with the values those instructions define.
///
/// Call lowering is an intra-block transformation, so a stream models one
/// block's worth of instructions. The stream keeps a definition map so the
/// lowering engine can walk value-producing chains (callee resolution, the
/// pass-through verification of tail-call analysis) without mutating the
/// underlying graph.
#[derive(Default, Debug)]
pub struct MachineStream {
    insts: Vec<Inst>,
    tys: Vec<Ty>,
    defs: SaHashMap<Value, usize>,
    live_ins: SmallVec<[PReg; 8]>,
}

impl MachineStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh value of type `ty` with no definition yet.
    pub fn create_value(&mut self, ty: Ty) -> Value {
        self.tys.push(ty);

        Value::new(self.tys.len() - 1)
    }

    /// The type of `value`.
    #[inline]
    pub fn value_ty(&self, value: Value) -> Ty {
        self.tys[value.index()]
    }

    /// The number of values created so far.
    #[inline]
    pub fn num_values(&self) -> usize {
        self.tys.len()
    }

    /// Appends `inst` to the stream, recording any values it defines.
    /// Returns the instruction's index.
    pub fn push(&mut self, inst: Inst) -> usize {
        let idx = self.insts.len();

        for def in inst.defs() {
            self.defs.insert(def, idx);
        }

        self.insts.push(inst);

        idx
    }

    /// Appends every instruction in `insts`, in order.
    pub fn extend(&mut self, insts: impl IntoIterator<Item = Inst>) {
        for inst in insts {
            self.push(inst);
        }
    }

    /// All instructions pushed so far, in program order.
    #[inline]
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    /// The instruction at `idx`.
    #[inline]
    pub fn inst(&self, idx: usize) -> &Inst {
        &self.insts[idx]
    }

    pub(crate) fn inst_mut(&mut self, idx: usize) -> &mut Inst {
        &mut self.insts[idx]
    }

    /// The instruction defining `value`, if one has been pushed.
    pub fn def_of(&self, value: Value) -> Option<&Inst> {
        self.defs.get(&value).map(|&idx| &self.insts[idx])
    }

    /// The instruction defining `value`, looking through copies of virtual
    /// values.
    ///
    /// Copies *from physical registers* are deliberately not looked through:
    /// the returned instruction is the copy itself, so callers can see which
    /// physical register a value was received in.
    pub fn def_ignoring_copies(&self, value: Value) -> Option<&Inst> {
        let mut cur = value;

        loop {
            let inst = self.def_of(cur)?;

            match inst {
                Inst::Move(Move {
                    src: Loc::Val(next),
                    ..
                }) => cur = *next,
                _ => return Some(inst),
            }
        }
    }

    /// Records `reg` as live into the function.
    pub fn add_live_in(&mut self, reg: PReg) {
        if !self.live_ins.contains(&reg) {
            self.live_ins.push(reg);
        }
    }

    /// Every physical register recorded as live into the function.
    #[inline]
    pub fn live_ins(&self) -> &[PReg] {
        &self.live_ins
    }

    /// Adds `reg` as an implicit def of the call instruction at `idx`.
    ///
    /// Mirrors the way result registers become implicit defs of an already
    /// emitted call during return-value capture.
    pub(crate) fn append_implicit_def(&mut self, idx: usize, reg: PReg) {
        match &mut self.insts[idx] {
            Inst::Call(call) => call.defs.push(reg),
            _ => panic!("implicit defs can only be appended to call instructions"),
        }
    }
}
