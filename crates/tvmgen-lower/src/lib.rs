/*! Lowers a decorated contract syntax tree into the typed TVM instruction
 * IR. The front end delivers resolved declarations and annotated
 * expressions; this crate drives the stack emitter through function,
 * control-flow and entry-point lowering, then hands the tree to the
 * optimizer pipeline.
 */

pub mod abi;
pub mod ast;
pub mod context;
pub mod dict;
pub mod entry;
pub mod error;
pub mod expr;
pub mod func;
pub mod globals;
pub mod scan;
pub mod types;

pub use ast::{AbiVersion, ContractDef, PragmaHelper, UsageFlags};
pub use context::CompilerContext;
pub use error::{LowerError, Result};
pub use types::Ty;

use tvmgen_core::function::Contract;
use tvmgen_core::opt;

use crate::abi::{function_id_of, OutboundReason};
use crate::ast::{SpecialFunction, SrcLoc, Visibility};

/// Lowers a whole contract: the constructor wrapper first, then the user
/// functions, the storage macros, the dispatch entry points, getters and
/// finally the selector. The fixed optimization pipeline runs on the
/// result before it is returned.
pub fn lower_contract(contract: &ContractDef, pragma: PragmaHelper) -> Result<Contract> {
    let mut ctx = CompilerContext::new(contract, pragma);

    let contract_loc = SrcLoc::new(contract.name.clone(), 0);
    for var in &contract.state_vars {
        if !var.decl.ty.is_decodable() {
            return Err(LowerError::unsupported(
                &contract_loc,
                format!("state variable {} has unsupported type {}", var.decl.name, var.decl.ty),
            ));
        }
    }

    let mut pragmas = vec![format!(".version sol {}", env!("CARGO_PKG_VERSION"))];
    if ctx.usage.has_tvm_code {
        pragmas.push(".pragma selector-save-my-code".to_string());
    }

    let mut functions = Vec::new();
    functions.push(entry::generate_constructor(&mut ctx)?);

    let mut on_bounce_done = false;
    let mut receive_done = false;
    let mut fallback_done = false;
    for (index, function) in contract.functions.iter().enumerate() {
        ctx.set_current_function(index);
        match function.special {
            SpecialFunction::Constructor => {}
            SpecialFunction::OnBounce => {
                if !on_bounce_done {
                    on_bounce_done = true;
                    functions.push(entry::generate_receive_or_fallback_or_on_bounce(
                        &mut ctx,
                        function,
                        "on_bounce_macro",
                        1,
                    )?);
                }
            }
            SpecialFunction::Receive => {
                if !receive_done {
                    receive_done = true;
                    functions.push(entry::generate_receive_or_fallback_or_on_bounce(
                        &mut ctx,
                        function,
                        "receive_macro",
                        0,
                    )?);
                }
            }
            SpecialFunction::Fallback => {
                if !fallback_done {
                    fallback_done = true;
                    functions.push(entry::generate_receive_or_fallback_or_on_bounce(
                        &mut ctx,
                        function,
                        "fallback_macro",
                        0,
                    )?);
                }
            }
            SpecialFunction::OnTickTock => {
                functions.push(entry::generate_on_tick_tock(&mut ctx, function)?);
            }
            SpecialFunction::OnCodeUpgrade => {
                functions.push(entry::generate_on_code_upgrade(&mut ctx, function)?);
            }
            SpecialFunction::None => {
                if function.visibility == Visibility::Public {
                    functions.push(entry::generate_public_function(&mut ctx, function)?);
                    let function_id = function_id_of(
                        &function.name,
                        &function.params,
                        &function.returns,
                        OutboundReason::RemoteCallInternal,
                    );
                    ctx.add_public_function(function_id, function.name.clone());
                }
                let internal_name = ctx.function_internal_name(function);
                if function.visibility != Visibility::Private {
                    functions.push(entry::generate_private_function(&internal_name)?);
                }
                functions.push(entry::generate_macro(
                    &mut ctx,
                    function,
                    Some(format!("{internal_name}_macro")),
                )?);
            }
        }
    }

    functions.push(entry::generate_c7_to_c4(&mut ctx)?);
    if ctx.usage.has_await_call {
        functions.push(entry::generate_c7_to_c4_for_await(&mut ctx)?);
    }
    functions.push(entry::generate_c4_to_c7(&mut ctx)?);
    functions.push(entry::generate_c4_to_c7_with_init_storage(&mut ctx)?);
    functions.push(entry::generate_replay_protection(&mut ctx)?);
    functions.push(entry::generate_main_internal(&mut ctx)?);
    if ctx.usage.has_await_call {
        functions.push(entry::generate_check_resume(&mut ctx)?);
    }
    functions.push(entry::generate_main_external(&mut ctx)?);

    for (index, var) in contract.state_vars.iter().enumerate() {
        if var.is_public {
            functions.push(entry::generate_getter(&mut ctx, index)?);
            let function_id = function_id_of(
                &var.decl.name,
                &[],
                std::slice::from_ref(&var.decl),
                OutboundReason::RemoteCallInternal,
            );
            ctx.add_public_function(function_id, var.decl.name.clone());
        }
    }

    functions.push(entry::generate_public_function_selector(&mut ctx)?);

    let mut lowered = Contract::new(pragmas, functions);

    opt::DeleterAfterRet::run(&mut lowered);
    opt::LocSquasher::run(&mut lowered);
    opt::optimize_contract(&mut lowered).expect("optimizer passes are infallible");

    Ok(lowered)
}
