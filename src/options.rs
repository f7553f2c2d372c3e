//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Configuration for one lowering session.

/// A set of detailed configuration options that are provided during call
/// lowering.
///
/// This effectively models the `-fthing` argument pattern in GCC-like
/// compilers.
#[derive(Copy, Clone, Debug)]
pub struct LowerOptions {
    /// Whether every call under a TCO-guaranteeing convention must be
    /// lowered as a true tail call, growing or shrinking the frame as
    /// needed. When disabled, only ABI-preserving sibling calls (which
    /// reuse the caller's existing argument area) are emitted.
    pub guaranteed_tail_calls: bool,

    /// Whether functions with a hidden struct-return pointer parameter
    /// return that pointer in the convention's result slot.
    pub return_sret_pointer: bool,

    /// Whether branch-target enforcement is active for the function being
    /// lowered. Indirect tail calls cannot be emitted safely under it.
    pub branch_target_enforcement: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            guaranteed_tail_calls: false,
            return_sret_pointer: true,
            branch_target_enforcement: false,
        }
    }
}
