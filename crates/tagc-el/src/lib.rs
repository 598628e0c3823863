//! tagc expression language: `${...}` / `#{...}` lexing, parsing and
//! compile-time folding of constant expressions.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;

pub use ast::{BinOp, Expr, Part, Template, UnaryOp};
pub use error::{ElError, ElResult};
pub use eval::{eval, eval_template};
pub use parser::parse;
pub use value::{format_double, format_float, Value};
