//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::abi::TargetAbi;
use crate::frame::{AdjustmentOracle, FrameLayout, FunctionAbi};
use crate::mir::MachineStream;
use crate::options::LowerOptions;

/// Everything one lowering invocation operates on, bundled so it can be
/// threaded through the handlers without a parameter avalanche.
///
/// A context borrows state belonging to exactly one function; distinct
/// functions own distinct contexts and may be lowered concurrently by an
/// outer scheduler. The engine itself holds no process-wide mutable state.
pub struct LowerCtx<'a> {
    /// The instruction stream being lowered into
    pub stream: &'a mut MachineStream,
    /// The target's convention tables and ABI metadata
    pub abi: &'a dyn TargetAbi,
    /// The target's frame-layout engine
    pub frame: &'a mut dyn FrameLayout,
    /// The target's stack-adjustment cost oracle
    pub oracle: &'a dyn AdjustmentOracle,
    /// The enclosing function's persisted ABI state
    pub func: &'a mut FunctionAbi,
    /// Session configuration
    pub options: LowerOptions,
}
