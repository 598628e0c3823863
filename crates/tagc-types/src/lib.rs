//! Shared types for the tagc template compiler.
//!
//! This crate defines the template node tree, source spans, the structured
//! error type, handler metadata and the built-in element table used across
//! all compiler stages.

mod builder;
mod builtins;
mod config;
mod error;
mod span;
mod target;
pub mod document;
pub mod taglib;

pub use builder::DocumentBuilder;
pub use builtins::{
    BuiltinAttribute, BuiltinSpec, BuiltinTable, ControlKind, CORE_EL_URI, CORE_RT_URI, CORE_URI,
};
pub use config::PageConfig;
pub use document::{Document, ElementName, Node, NodeId, NodeKind, StaticAttribute};
pub use error::{ErrorCategory, ErrorCode, TemplateError};
pub use span::{FileId, SourceFile, Span};
pub use taglib::{
    AttributeInfo, BodyContent, HandlerKind, HandlerType, InstanceScope, Introspector,
    LibraryError, Lifecycle, Setter, TagLibrary, VariableInfo, VariableScope,
};
pub use target::{Primitive, TargetType};

/// Result type used throughout the tagc compiler.
pub type Result<T> = std::result::Result<T, TemplateError>;
