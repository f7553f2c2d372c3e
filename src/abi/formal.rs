//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The callee side of the ABI boundary: binding a function's formal
//! parameters to their live-in locations at entry, and lowering its return
//! value into the convention's result slots at exit.

use crate::abi::handlers::{drive_assignments, FormalArgHandler, OutgoingValueHandler};
use crate::abi::{ArgFlags, LowerCtx, LowerError, LowerResult, Part, Signature, TargetAbi};
use crate::mir::{AbiType, Inst, MachineStream, Merge, Ret, Unmerge, Value};
use smallvec::SmallVec;

/// Binds a function's formal parameters to their ABI locations at function
/// entry.
///
/// `values` holds one value per declared parameter, in order. Zero-sized
/// parameters contribute no physical state and are skipped. Records the
/// function's incoming-argument-area size (consumed later by tail-call
/// analysis) and, for variadic functions, the frame slot where variadic
/// arguments begin.
pub fn lower_formal_arguments(
    ctx: &mut LowerCtx<'_>,
    sig: &Signature,
    values: &[Value],
) -> LowerResult<()> {
    assert_eq!(
        sig.params.len(),
        values.len(),
        "one value per declared parameter"
    );

    // tail-call analysis of calls inside this function consults the
    // caller's own parameter attributes
    ctx.func
        .set_param_flags(sig.params.iter().map(|param| param.flags));

    let mut parts = Vec::new();
    let mut merges = Vec::new();

    for (index, (param, &value)) in sig.params.iter().zip(values).enumerate() {
        if param.ty.bytes() == 0 {
            continue;
        }

        if param.flags.in_reg || param.flags.error_indirect || param.flags.nest {
            return Err(LowerError::UnsupportedParamFlags { index });
        }

        if param.flags.sret && ctx.options.return_sret_pointer {
            ctx.func.set_sret_value(value);
        }

        let before = parts.len();

        split_incoming(ctx.stream, value, &param.ty, param.flags, &mut parts, &mut merges);

        if parts.len() - before > 1 && param.flags.sret {
            return Err(LowerError::MultiPartValue {
                what: "struct-return parameter",
            });
        }
    }

    let conv = sig.conv;
    let assignment = ctx.abi.classify_args(conv, &parts, sig.variadic)?;

    drive_assignments(&mut FormalArgHandler, ctx, conv, &parts, &assignment);

    for merge in merges {
        ctx.stream.push(Inst::Merge(merge));
    }

    Ok(())
}

/// Lowers a function's return value into the convention's result slots and
/// emits the return instruction.
///
/// When the function carries a struct-return binding, the hidden pointer
/// replaces the nominal return value for classification; such a function
/// must otherwise return void.
pub fn lower_return(ctx: &mut LowerCtx<'_>, value: Option<(Value, AbiType)>) -> LowerResult<()> {
    assert!(
        ctx.func.sret_value().is_none() || value.is_none(),
        "struct-return functions must return void"
    );

    let ptr_ty = ctx.abi.ptr_ty();
    let effective = match ctx.func.sret_value() {
        Some(sret) => Some((sret, AbiType::Scalar(ptr_ty))),
        None => value,
    };

    let mut parts = Vec::new();

    if let Some((value, ty)) = &effective {
        split_return_value(ctx.stream, *value, ty, &mut parts);
    }

    let mut uses = SmallVec::new();

    if !parts.is_empty() {
        let conv = ctx.func.conv();
        let variadic = ctx.func.variadic();
        let assignment = ctx.abi.classify_rets(conv, &parts, variadic)?;
        let mut handler = OutgoingValueHandler::new(ctx);

        drive_assignments(&mut handler, ctx, conv, &parts, &assignment);

        uses = handler.take_uses();
    }

    ctx.stream.push(Inst::Ret(Ret {
        uses: uses.into_iter().collect(),
    }));

    Ok(())
}

/// Splits an incoming logical value into scalar parts. Multi-element
/// aggregates bind fresh part values, rebuilt into the logical value by the
/// merge pushed after binding.
fn split_incoming(
    stream: &mut MachineStream,
    value: Value,
    ty: &AbiType,
    flags: ArgFlags,
    parts: &mut Vec<Part>,
    merges: &mut Vec<Merge>,
) {
    match ty {
        AbiType::Scalar(ty) => parts.push(Part {
            value,
            ty: *ty,
            flags,
        }),
        AbiType::Aggregate(elems) => match elems.as_slice() {
            [] => {}
            [single] => parts.push(Part {
                value,
                ty: *single,
                flags,
            }),
            elems => {
                let values: SmallVec<[Value; 2]> =
                    elems.iter().map(|&ty| stream.create_value(ty)).collect();

                parts.extend(values.iter().zip(elems).map(|(&value, &ty)| Part {
                    value,
                    ty,
                    flags,
                }));
                merges.push(Merge {
                    dst: value,
                    parts: values,
                });
            }
        },
    }
}

/// Splits an outgoing return value into scalar parts, emitting an unmerge
/// for multi-element aggregates.
fn split_return_value(stream: &mut MachineStream, value: Value, ty: &AbiType, parts: &mut Vec<Part>) {
    let flags = ArgFlags::default();

    match ty {
        AbiType::Scalar(ty) if ty.bytes() == 0 => {}
        AbiType::Scalar(ty) => parts.push(Part {
            value,
            ty: *ty,
            flags,
        }),
        AbiType::Aggregate(elems) => match elems.as_slice() {
            [] => {}
            [single] => parts.push(Part {
                value,
                ty: *single,
                flags,
            }),
            elems => {
                let values: SmallVec<[Value; 2]> =
                    elems.iter().map(|&ty| stream.create_value(ty)).collect();

                stream.push(Inst::Unmerge(Unmerge {
                    parts: values.clone(),
                    src: value,
                }));

                parts.extend(values.iter().zip(elems).map(|(&value, &ty)| Part {
                    value,
                    ty,
                    flags,
                }));
            }
        },
    }
}
