use thiserror::Error;

use crate::ast::SrcLoc;

/// Constructs the back-end rejects; each carries the source location of
/// the offending node. Internal invariant violations are assertions, not
/// values of this type.
#[derive(Error, Debug)]
pub enum LowerError {
    #[error("{file}:{line}: {message}")]
    Unsupported { file: String, line: u32, message: String },
}

impl LowerError {
    pub fn unsupported(loc: &SrcLoc, message: impl Into<String>) -> Self {
        LowerError::Unsupported { file: loc.file.clone(), line: loc.line, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, LowerError>;
