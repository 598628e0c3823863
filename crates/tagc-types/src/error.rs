use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Structural,
    Expression,
    Reference,
    Consistency,
    Internal,
}

/// Numeric error code (E100–E499, E900).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Structural errors (E100–E199) ──
    pub const DUPLICATE_ATTRIBUTE: Self = Self(100);
    pub const UNKNOWN_ATTRIBUTE: Self = Self(101);
    pub const MISSING_REQUIRED_ATTRIBUTE: Self = Self(102);
    pub const CONTENT_NOT_ALLOWED: Self = Self(103);
    pub const MULTIPLE_BODIES: Self = Self(104);
    pub const BODY_REQUIRED: Self = Self(105);
    pub const MISPLACED_ELEMENT: Self = Self(106);

    // ── Expression errors (E200–E299) ──
    pub const DEFERRED_SYNTAX_REQUIRED: Self = Self(200);
    pub const DEFERRED_SYNTAX_NOT_ALLOWED: Self = Self(201);
    pub const IMMEDIATE_SYNTAX_NOT_ALLOWED: Self = Self(202);
    pub const RUNTIME_EXPRESSION_NOT_ALLOWED: Self = Self(203);
    pub const LITERAL_COERCION_FAILED: Self = Self(204);
    pub const SCRIPTING_NOT_ALLOWED: Self = Self(205);
    pub const MALFORMED_EXPRESSION: Self = Self(206);
    pub const VOID_METHOD_LITERAL: Self = Self(207);
    pub const INVALID_ATTRIBUTE_VALUE: Self = Self(208);

    // ── Reference errors (E300–E399) ──
    pub const UNKNOWN_ELEMENT: Self = Self(300);
    pub const NO_SETTER: Self = Self(301);
    pub const UNKNOWN_DIRECTIVE: Self = Self(302);
    pub const INVALID_VARIABLE_NAME: Self = Self(303);

    // ── Consistency errors (E400–E499) ──
    pub const CONFLICTING_DIRECTIVE: Self = Self(400);

    // ── Internal (E900) ──
    pub const INTERNAL: Self = Self(900);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Structural,
            200..=299 => ErrorCategory::Expression,
            300..=399 => ErrorCategory::Reference,
            400..=499 => ErrorCategory::Consistency,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Expression => write!(f, "expression"),
            Self::Reference => write!(f, "reference"),
            Self::Consistency => write!(f, "consistency"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// A located template compilation error.
///
/// Compilation stops at the first one; the host renders it from the
/// structured fields rather than parsing the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateError {
    /// Template file name.
    pub file: String,
    /// Error code (e.g., E204).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Source location.
    #[serde(flatten)]
    pub span: Span,
    /// The template line the error starts on, when the source text is known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub excerpt: String,
    /// Optional fix suggestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a new error.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            category: code.category(),
            message: message.into(),
            span,
            excerpt: excerpt.into(),
            suggestion: None,
        }
    }

    /// An internal error with no template location.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("", ErrorCode::INTERNAL, message, Span::default(), "")
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.file, self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for TemplateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::DUPLICATE_ATTRIBUTE.category(),
            ErrorCategory::Structural
        );
        assert_eq!(
            ErrorCode::LITERAL_COERCION_FAILED.category(),
            ErrorCategory::Expression
        );
        assert_eq!(ErrorCode::NO_SETTER.category(), ErrorCategory::Reference);
        assert_eq!(
            ErrorCode::CONFLICTING_DIRECTIVE.category(),
            ErrorCategory::Consistency
        );
        assert_eq!(ErrorCode::INTERNAL.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::LITERAL_COERCION_FAILED), "E204");
        assert_eq!(format!("{}", ErrorCode::UNKNOWN_ELEMENT), "E300");
    }

    #[test]
    fn test_error_display_includes_location() {
        let err = TemplateError::new(
            "index.tpl",
            ErrorCode::MISSING_REQUIRED_ATTRIBUTE,
            "required attribute 'name' missing from <x:hello>",
            Span::new(4, 3, 4, 20),
            "  <x:hello/>",
        );
        assert_eq!(
            err.to_string(),
            "index.tpl:4:3: E102 [structural] required attribute 'name' missing from <x:hello>"
        );
    }

    #[test]
    fn test_error_json_serialization() {
        let err = TemplateError::new(
            "index.tpl",
            ErrorCode::LITERAL_COERCION_FAILED,
            "parameter format error: '12x' is not a valid int",
            Span::new(12, 5, 12, 22),
            "<x:count value=\"12x\"/>",
        )
        .with_suggestion("use a decimal integer literal");

        let json = serde_json::to_string_pretty(&err).unwrap();
        assert!(json.contains("\"code\""));
        assert!(json.contains("\"excerpt\""));
        assert!(json.contains("\"suggestion\""));
        assert!(json.contains("\"line\""));
        assert!(json.contains("\"column\""));
        assert!(json.contains("\"end_column\""));
        assert!(json.contains("\"expression\""));

        let back: TemplateError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_internal_error_skips_empty_fields() {
        let json = serde_json::to_string(&TemplateError::internal("boom")).unwrap();
        assert!(!json.contains("excerpt"));
        assert!(!json.contains("suggestion"));
        assert!(json.contains("\"internal\""));
    }
}
