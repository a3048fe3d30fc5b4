/*! Typed instruction IR for a stack-based contract VM, plus the
 * stack-tracking emitter the lowering passes drive and the optimizer
 * framework that rewrites the produced trees. The IR is append-only
 * during emission and rewritable (block by block) during optimization.
 */

pub mod catalog;
pub mod consts;
pub mod function;
pub mod inst;
pub mod ir_persist;
pub mod opt;
pub mod pusher;
pub mod stack;

pub use function::{Contract, Function, FunctionKind};
pub use inst::{
    BlockKind, CellKind, CodeBlock, Condition, GenOp, GlobOp, GlobOpcode, HardCode, IfElse,
    IfElseKind, Inst, LogCircuit, LogicOp, PushCellOrSlice, RetKind, StackOp, StackOpcode,
    SubKind, SubProgram,
};
pub use pusher::{MsgType, StackPusher};
pub use stack::{DeclId, TvmStack};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("Malformed block: {0}")]
    MalformedBlock(String),
    #[error("Unknown mnemonic: {0}")]
    UnknownMnemonic(String),
}

pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests;
