//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! A reference target ABI for unit tests.
//!
//! This models a small integer machine with an 8-byte stack unit and a
//! handful of named conventions, enough to exercise every lowering path
//! without depending on any real processor's tables.

use crate::abi::{
    ClassifyError, ConventionId, FixedConventionValue, LowerCtx, Part, RegMask, Slot,
    SlotAssignment, TargetAbi,
};
use crate::frame::{AdjustmentOracle, FrameIdx, FrameLayout, FunctionAbi, StackAdjustment};
use crate::mir::{MachineStream, PReg, Ty};
use crate::options::LowerOptions;

pub(crate) const R0: PReg = PReg::int(0);
pub(crate) const R1: PReg = PReg::int(1);
pub(crate) const R2: PReg = PReg::int(2);
pub(crate) const R3: PReg = PReg::int(3);
pub(crate) const R4: PReg = PReg::int(4);
pub(crate) const R5: PReg = PReg::int(5);
pub(crate) const R6: PReg = PReg::int(6);
pub(crate) const R7: PReg = PReg::int(7);
pub(crate) const SP: PReg = PReg::int(31);

/// The default C-like convention.
pub(crate) const STD: ConventionId = ConventionId(0);
/// An internal convention with guaranteed-TCO semantics.
pub(crate) const FAST: ConventionId = ConventionId(1);
/// A convention that may never be tail-called.
pub(crate) const COLD: ConventionId = ConventionId(2);
/// A convention that requires a constant environment word in [`FLAGS_WORD_REG`].
pub(crate) const FLAGS: ConventionId = ConventionId(3);
/// A convention whose first argument travels in the callee-saved `r4`.
pub(crate) const PRES: ConventionId = ConventionId(4);

pub(crate) const FLAGS_WORD_REG: PReg = R5;
pub(crate) const FLAGS_WORD: i64 = 0x89F0;

const STACK_UNIT: u64 = 8;

/// The reference [`TargetAbi`] implementation.
pub(crate) struct TestAbi;

impl TestAbi {
    fn arg_regs(conv: ConventionId) -> Result<&'static [PReg], ClassifyError> {
        match conv {
            STD | FLAGS => Ok(&[R0, R1, R2]),
            FAST => Ok(&[R0, R1, R2, R3]),
            COLD => Ok(&[R0]),
            PRES => Ok(&[R4, R0, R1]),
            _ => Err(ClassifyError::UnknownConvention { conv }),
        }
    }

    fn ret_regs(conv: ConventionId) -> Result<&'static [PReg], ClassifyError> {
        Self::arg_regs(conv)?;

        match conv {
            PRES => Ok(&[R0]),
            _ => Ok(&[R0, R1]),
        }
    }

    fn classify(
        conv: ConventionId,
        regs: &'static [PReg],
        parts: &[Part],
    ) -> Result<SlotAssignment, ClassifyError> {
        let mut next_reg = regs.iter().copied();
        let mut slots = Vec::with_capacity(parts.len());
        let mut stack_bytes = 0;

        for part in parts {
            let bytes = part.ty.bytes();

            if bytes > 2 * STACK_UNIT {
                return Err(ClassifyError::Unplaceable { conv, ty: part.ty });
            }

            let size = bytes.div_ceil(STACK_UNIT) * STACK_UNIT;

            let slot = if size == STACK_UNIT {
                next_reg.next().map(Slot::Reg)
            } else {
                // double-unit values never travel in registers here
                None
            };

            slots.push(slot.unwrap_or_else(|| {
                let offset = stack_bytes as i64;
                stack_bytes += size;

                Slot::Stack { offset, size }
            }));
        }

        Ok(SlotAssignment { slots, stack_bytes })
    }
}

impl TargetAbi for TestAbi {
    fn classify_args(
        &self,
        conv: ConventionId,
        parts: &[Part],
        _: bool,
    ) -> Result<SlotAssignment, ClassifyError> {
        Self::classify(conv, Self::arg_regs(conv)?, parts)
    }

    fn classify_rets(
        &self,
        conv: ConventionId,
        parts: &[Part],
        _: bool,
    ) -> Result<SlotAssignment, ClassifyError> {
        Self::classify(conv, Self::ret_regs(conv)?, parts)
    }

    fn preserved_mask(&self, conv: ConventionId) -> RegMask {
        match conv {
            COLD => RegMask::preserving(&[R2, R3, R4, R5, R6, R7]),
            FLAGS | PRES => RegMask::preserving(&[R3, R4, R5, R6, R7]),
            _ => RegMask::preserving(&[R4, R5, R6, R7]),
        }
    }

    fn may_tail_call(&self, conv: ConventionId) -> bool {
        conv != COLD
    }

    fn guarantees_tco(&self, conv: ConventionId) -> bool {
        conv == FAST
    }

    fn fixed_convention_value(&self, conv: ConventionId) -> Option<FixedConventionValue> {
        (conv == FLAGS).then_some(FixedConventionValue {
            reg: FLAGS_WORD_REG,
            value: FLAGS_WORD,
            ty: Ty::int(16),
        })
    }

    fn stack_unit(&self) -> u64 {
        STACK_UNIT
    }

    fn ptr_ty(&self) -> Ty {
        Ty::ptr(64)
    }

    fn stack_pointer(&self) -> PReg {
        SP
    }
}

/// A [`FrameLayout`] that records what the lowering engine asked of it.
#[derive(Default)]
pub(crate) struct RecordingFrame {
    /// Every fixed stack object created, as `(size, offset)` pairs
    pub(crate) fixed: Vec<(u64, i64)>,
    /// Whether a tail call was recorded
    pub(crate) has_tail_call: bool,
}

impl FrameLayout for RecordingFrame {
    fn create_fixed_stack_slot(&mut self, size: u64, offset: i64) -> FrameIdx {
        self.fixed.push((size, offset));

        FrameIdx::new(self.fixed.len() - 1)
    }

    fn mark_has_tail_call(&mut self) {
        self.has_tail_call = true;
    }
}

/// A deterministic stand-in for the target's cost oracle.
pub(crate) struct TestOracle;

impl AdjustmentOracle for TestOracle {
    fn cheapest(&self, bytes: u64) -> StackAdjustment {
        match bytes {
            0 => StackAdjustment::None,
            1..=8 => StackAdjustment::Tiny,
            9..=32 => StackAdjustment::Small,
            33..=128 => StackAdjustment::Medium,
            129..=512 => StackAdjustment::Large,
            _ => StackAdjustment::All,
        }
    }
}

/// Owns everything a [`LowerCtx`] borrows, so tests can build contexts
/// without ceremony.
pub(crate) struct TestBed {
    pub(crate) stream: MachineStream,
    pub(crate) abi: TestAbi,
    pub(crate) frame: RecordingFrame,
    pub(crate) oracle: TestOracle,
    pub(crate) func: FunctionAbi,
    pub(crate) options: LowerOptions,
}

impl TestBed {
    pub(crate) fn new(conv: ConventionId, variadic: bool) -> Self {
        Self {
            stream: MachineStream::new(),
            abi: TestAbi,
            frame: RecordingFrame::default(),
            oracle: TestOracle,
            func: FunctionAbi::new(conv, variadic),
            options: LowerOptions::default(),
        }
    }

    pub(crate) fn ctx(&mut self) -> LowerCtx<'_> {
        LowerCtx {
            stream: &mut self.stream,
            abi: &self.abi,
            frame: &mut self.frame,
            oracle: &self.oracle,
            func: &mut self.func,
            options: self.options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ArgFlags;
    use crate::mir::Value;

    fn parts(tys: &[Ty]) -> Vec<Part> {
        let mut stream = MachineStream::new();

        tys.iter()
            .map(|&ty| Part {
                value: stream.create_value(ty),
                ty,
                flags: ArgFlags::default(),
            })
            .collect()
    }

    #[test]
    fn classification_is_deterministic() {
        let shapes: &[&[Ty]] = &[
            &[Ty::int(64); 5],
            &[Ty::int(32), Ty::int(128), Ty::int(64)],
            &[Ty::ptr(64), Ty::int(8)],
            &[],
        ];

        for conv in [STD, FAST, COLD, FLAGS, PRES] {
            for shape in shapes {
                for variadic in [false, true] {
                    let parts = parts(shape);
                    let first = TestAbi.classify_args(conv, &parts, variadic).unwrap();
                    let second = TestAbi.classify_args(conv, &parts, variadic).unwrap();

                    assert_eq!(first, second);
                }
            }
        }
    }

    #[test]
    fn stack_offsets_are_monotonic() {
        let shape = [
            Ty::int(64),
            Ty::int(128),
            Ty::int(64),
            Ty::int(32),
            Ty::int(128),
            Ty::int(64),
            Ty::int(64),
        ];

        for conv in [STD, FAST, COLD, PRES] {
            let assignment = TestAbi.classify_args(conv, &parts(&shape), false).unwrap();
            let mut last = i64::MIN;

            for slot in assignment.slots {
                if let Slot::Stack { offset, size } = slot {
                    assert!(offset >= last, "offsets must be non-decreasing");
                    assert_eq!(size % STACK_UNIT, 0, "sizes are rounded to the unit");
                    last = offset;
                }
            }
        }
    }

    #[test]
    fn slot_sizes_round_up_to_unit() {
        let assignment = TestAbi
            .classify_args(COLD, &parts(&[Ty::int(64), Ty::int(8), Ty::int(96)]), false)
            .unwrap();

        assert_eq!(
            assignment.slots,
            vec![
                Slot::Reg(R0),
                Slot::Stack { offset: 0, size: 8 },
                Slot::Stack { offset: 8, size: 16 },
            ]
        );
        assert_eq!(assignment.stack_bytes, 24);
    }

    #[test]
    fn oversized_parts_fail_classification() {
        let result = TestAbi.classify_args(STD, &parts(&[Ty::int(256)]), false);

        assert!(matches!(result, Err(ClassifyError::Unplaceable { .. })));
    }

    #[test]
    fn unknown_conventions_fail_classification() {
        let result = TestAbi.classify_args(ConventionId(99), &parts(&[Ty::int(64)]), false);

        assert!(matches!(
            result,
            Err(ClassifyError::UnknownConvention { .. })
        ));
    }

    #[test]
    fn values_do_not_affect_classification() {
        // determinism is over (type, flags) sequences, not value identities
        let a = [Part {
            value: Value::new(10),
            ty: Ty::int(64),
            flags: ArgFlags::default(),
        }];
        let b = [Part {
            value: Value::new(99),
            ty: Ty::int(64),
            flags: ArgFlags::default(),
        }];

        assert_eq!(
            TestAbi.classify_args(STD, &a, false).unwrap(),
            TestAbi.classify_args(STD, &b, false).unwrap()
        );
    }
}
