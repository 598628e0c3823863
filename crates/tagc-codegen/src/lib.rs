//! tagc code generator.
//!
//! Turns a validated template tree into the source of one compiled unit: a
//! class with a page routine, a fragment class, pooled tag state, evaluator
//! slots and text constants, plus a line map back to the template.

mod body;
mod builtin;
mod compiler;
mod error;
mod escape;
mod expr;
mod fragment;
mod registry;
mod runtime;
mod source_map;
mod state;
mod tables;
mod tag;
mod writer;

pub use compiler::{generate, CodegenInput, CompiledUnit, Dependency, InstanceSummary};
pub use error::{CodegenError, CodegenResult};
pub use escape::{is_identifier, is_variable_name, java_string, xml};
pub use expr::{fold_literal, parse_primitive, parse_signature};
pub use registry::{RegistryScope, TagInstance, TagInstanceId, TagRegistry};
pub use source_map::{LineMap, LineMapEntry};
pub use writer::JavaWriter;
