//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::abi::ClassifyError;
use thiserror::Error;

/// The recoverable failures call lowering can report.
///
/// Every variant means "this input cannot be lowered by the optimizing
/// path"; the caller is expected to discard any partially emitted
/// instructions and retry with a non-optimizing fallback strategy. Internal
/// invariant violations (mismatched part/slot counts and the like) are
/// programming errors and panic instead of appearing here.
#[derive(Debug, Error)]
pub enum LowerError {
    /// The convention tables could not place a value.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// A parameter carries attributes the lowering does not support yet
    /// (forced-register placement, sentinel-argument protocols,
    /// indirect-error plumbing).
    #[error("parameter {index} has attributes unsupported by call lowering")]
    UnsupportedParamFlags {
        /// The parameter's position in the signature
        index: usize,
    },

    /// A value that must live in a single register was split into multiple
    /// parts.
    #[error("{what} is split across multiple registers and cannot be lowered")]
    MultiPartValue {
        /// What kind of value was split
        what: &'static str,
    },

    /// A call marked as a mandatory tail call failed tail-call eligibility.
    /// Downgrading it to an ordinary call would change program semantics,
    /// so the whole lowering fails instead.
    #[error("mandatory tail call is not eligible for tail-call lowering")]
    MandatoryTailCall,

    /// An indirect tail call was requested while branch-target enforcement
    /// is active.
    #[error("indirect tail calls are not supported under branch-target enforcement")]
    BranchTargetEnforcement,
}

/// The result type produced by the lowering entry points.
pub type LowerResult<T> = Result<T, LowerError>;
