//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The ABI boundary itself: calling-convention contracts, the call
//! sequence builder, tail-call eligibility analysis, and formal
//! argument/return lowering.
//!
//! The flow for one call site is [`lower_call`]: it resolves the callee,
//! splits values to scalar parts, asks [`is_eligible_for_tail_call`]
//! whether tail-call lowering applies, and emits either a tail-return or a
//! full call sequence. [`lower_formal_arguments`] and [`lower_return`] are
//! the independent callee-side mirrors run at function entry and exit.

mod calls;
mod context;
mod conv;
mod eligibility;
mod errors;
mod formal;
mod handlers;

pub use calls::*;
pub use context::*;
pub use conv::*;
pub use eligibility::*;
pub use errors::*;
pub use formal::*;
