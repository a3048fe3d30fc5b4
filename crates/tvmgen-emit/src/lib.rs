//! Serializes the instruction IR to Target-VM assembly text. The printer
//! is pure over the IR: it never mutates what it walks.

pub mod emitter;
pub mod printer;

pub use emitter::{EmitContext, Emitter};
pub use printer::Printer;
