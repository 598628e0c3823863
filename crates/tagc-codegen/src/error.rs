//! Codegen error types.

use tagc_types::TemplateError;
use thiserror::Error;

/// Errors that can occur while generating a compiled unit.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A located template violation found during generation.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),
}

impl CodegenError {
    /// Convert into the located error surfaced to callers.
    pub fn into_template_error(self) -> TemplateError {
        match self {
            CodegenError::Template(err) => err,
            CodegenError::Internal(message) => TemplateError::internal(message),
        }
    }
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
