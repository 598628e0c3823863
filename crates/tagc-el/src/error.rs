//! Expression-language error types.

use thiserror::Error;

/// Lexing, parsing and constant-evaluation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal at offset {0}")]
    UnterminatedString(usize),

    #[error("unterminated expression starting at offset {0}")]
    UnterminatedExpression(usize),

    #[error("empty expression at offset {0}")]
    EmptyExpression(usize),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        offset: usize,
    },

    /// A value could not be converted to the requested type.
    #[error("cannot coerce {from} to {to}")]
    Coercion { from: String, to: String },

    #[error("division by zero")]
    DivisionByZero,

    /// The expression reads variables or calls functions.
    #[error("'{0}' needs a runtime context")]
    NotConstant(String),
}

/// Result alias for expression-language operations.
pub type ElResult<T> = Result<T, ElError>;
