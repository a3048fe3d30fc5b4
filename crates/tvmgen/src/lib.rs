/*! Umbrella crate re-exporting the code-generation pipeline: the typed
 * instruction IR and stack emitter (`core`), the AST lowering (`lower`)
 * and the assembly printer (`emit`).
 */

pub use tvmgen_core as core;
pub use tvmgen_emit as emit;
pub use tvmgen_lower as lower;

pub use tvmgen_core::{Contract, Function, FunctionKind, StackPusher};
pub use tvmgen_emit::Printer;
pub use tvmgen_lower::{lower_contract, ContractDef, LowerError, PragmaHelper};

/// Lowers a contract and prints it, the whole pipeline in one call.
pub fn compile_to_assembly(
    contract: &ContractDef,
    pragma: PragmaHelper,
) -> Result<String, anyhow::Error> {
    let lowered = lower_contract(contract, pragma)?;
    Printer::print_to_string(&lowered)
}
