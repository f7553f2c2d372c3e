//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

#![allow(dead_code)]
#![deny(
    unreachable_pub,
    missing_docs,
    missing_abi,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]

//! # Garnet
//!
//! The ABI call-lowering core of the Garnet code generator. This crate turns
//! an abstract call-site description (callee, arguments, return, calling
//! convention, tail-call request) into the concrete machine-level operation
//! sequence that implements the target's calling convention: argument and
//! return-value marshalling, tail-call eligibility analysis and emission,
//! and the call-frame bookkeeping threaded through both.
//!
//! The crate is a library-level transformation invoked by the surrounding
//! code generator. It consumes (but does not define) the target's
//! calling-convention classification tables, its stack-frame layout engine,
//! and its stack-adjustment cost oracle; those collaborators are modeled as
//! traits in [`abi`] and [`frame`].

pub mod abi;
pub mod frame;
pub mod mir;
pub mod options;
pub mod utility;

#[cfg(test)]
pub(crate) mod testing;
