//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The minimal machine-level IR that call lowering emits into.
//!
//! This intentionally models only the operations a call sequence can contain
//! (copies, stores, pushes, address arithmetic, the call/tail-return/return
//! instructions and the call-frame markers), plus the virtual-value and
//! physical-register plumbing those operations need. Instruction *encoding*
//! and the concrete register set of any processor are out of scope; both are
//! supplied by the surrounding code generator.

mod inst;
mod regs;
mod stream;

pub use inst::*;
pub use regs::*;
pub use stream::*;
