//! Handler metadata: what the compiler knows about each custom element.
//!
//! A [`TagLibrary`] maps qualified element names to [`HandlerType`]s. The
//! code generator only reads it through the [`Introspector`] trait, which is
//! where a host would plug in reflection over real handler classes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TargetType;

fn default_true() -> bool {
    true
}

fn default_string_type() -> TargetType {
    TargetType::String
}

fn default_object_type() -> TargetType {
    TargetType::Object
}

/// Classic handlers are pooled and driven through start/end hooks; simple
/// handlers are created per invocation and run once through `doTag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    #[default]
    Classic,
    Simple,
}

/// What an element's body may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyContent {
    Empty,
    Scriptless,
    Tagdependent,
    #[default]
    Template,
}

/// Lifetime of a handler object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceScope {
    /// One object per dispatch, held in the pooled tag state.
    #[default]
    Dispatch,
    /// One shared object for the whole compiled template.
    Template,
}

/// Where a handler-declared variable is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    AtBegin,
    #[default]
    Nested,
    AtEnd,
}

/// One attribute a handler accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Whether request-time values (`${}` or `<%= %>`) are accepted.
    #[serde(default = "default_true")]
    pub rtexpr: bool,
    #[serde(rename = "type", default = "default_string_type")]
    pub target: TargetType,
    /// Setter method name; `set` + capitalized name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setter: Option<String>,
    /// False when the attribute is declared but the class has no setter.
    #[serde(default = "default_true")]
    pub writable: bool,
    /// Expected type of a deferred value (`#{}`) attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_value: Option<String>,
    /// Method signature of a deferred method attribute, e.g. `java.lang.String action()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_method: Option<String>,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>, target: TargetType) -> Self {
        Self {
            name: name.into(),
            required: false,
            rtexpr: true,
            target,
            setter: None,
            writable: true,
            deferred_value: None,
            deferred_method: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn literal_only(mut self) -> Self {
        self.rtexpr = false;
        self
    }

    pub fn deferred_value(mut self, expected: impl Into<String>) -> Self {
        self.target = TargetType::ValueExpression;
        self.deferred_value = Some(expected.into());
        self
    }

    pub fn deferred_method(mut self, signature: impl Into<String>) -> Self {
        self.target = TargetType::MethodExpression;
        self.deferred_method = Some(signature.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn setter_name(&self) -> String {
        match &self.setter {
            Some(name) => name.clone(),
            None => bean_setter(&self.name),
        }
    }
}

/// `value` → `setValue`.
pub fn bean_setter(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

/// A variable a handler exposes to the surrounding template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_given: Option<String>,
    /// The variable is named by the literal value of this attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_from_attribute: Option<String>,
    #[serde(default = "default_object_type")]
    pub class: TargetType,
    #[serde(default = "default_true")]
    pub declare: bool,
    #[serde(default)]
    pub scope: VariableScope,
}

impl VariableInfo {
    pub fn given(name: impl Into<String>, class: TargetType, scope: VariableScope) -> Self {
        Self {
            name_given: Some(name.into()),
            name_from_attribute: None,
            class,
            declare: true,
            scope,
        }
    }

    pub fn from_attribute(attr: impl Into<String>, class: TargetType, scope: VariableScope) -> Self {
        Self {
            name_given: None,
            name_from_attribute: Some(attr.into()),
            class,
            declare: true,
            scope,
        }
    }
}

/// Which lifecycle hooks a classic handler has and which results they can
/// return. Controls how much wrapping the generated call site needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Lifecycle {
    pub do_start: bool,
    pub start_returns_skip: bool,
    pub start_returns_include: bool,
    pub start_returns_buffered: bool,
    pub do_init_body: bool,
    pub do_after_body: bool,
    pub after_returns_again: bool,
    pub do_end: bool,
    pub end_returns_skip_page: bool,
    pub end_returns_eval: bool,
    pub do_catch: bool,
    pub do_finally: bool,
}

impl Lifecycle {
    /// Plain tag: start may skip or include its body, end may skip the page.
    pub fn tag() -> Self {
        Self {
            do_start: true,
            start_returns_skip: true,
            start_returns_include: true,
            do_end: true,
            end_returns_skip_page: true,
            end_returns_eval: true,
            ..Self::default()
        }
    }

    /// Tag whose start always skips the body and whose end always continues.
    pub fn empty_tag() -> Self {
        Self {
            do_start: true,
            start_returns_skip: true,
            do_end: true,
            end_returns_eval: true,
            ..Self::default()
        }
    }

    /// Tag that may repeat its body.
    pub fn iteration() -> Self {
        Self {
            do_after_body: true,
            after_returns_again: true,
            ..Self::tag()
        }
    }

    /// Tag that may buffer its body.
    pub fn body_tag() -> Self {
        Self {
            start_returns_buffered: true,
            do_init_body: true,
            ..Self::iteration()
        }
    }

    /// Adds the catch/finally hooks.
    pub fn try_catch_finally(mut self) -> Self {
        self.do_catch = true;
        self.do_finally = true;
        self
    }

    /// Number of distinct `doStartTag` outcomes.
    pub fn start_outcomes(&self) -> usize {
        [
            self.start_returns_skip,
            self.start_returns_include,
            self.start_returns_buffered,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    /// Number of distinct `doEndTag` outcomes.
    pub fn end_outcomes(&self) -> usize {
        [self.end_returns_skip_page, self.end_returns_eval]
            .iter()
            .filter(|b| **b)
            .count()
    }
}

/// Everything known about one handler type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerType {
    pub class_name: String,
    #[serde(default)]
    pub kind: HandlerKind,
    #[serde(default)]
    pub body_content: BodyContent,
    #[serde(default)]
    pub attributes: Vec<AttributeInfo>,
    #[serde(default)]
    pub variables: Vec<VariableInfo>,
    #[serde(default = "Lifecycle::tag")]
    pub lifecycle: Lifecycle,
    /// Accepts attributes it does not declare via `setDynamicAttribute`.
    #[serde(default)]
    pub dynamic_attributes: bool,
    #[serde(default)]
    pub scope: InstanceScope,
}

impl HandlerType {
    pub fn classic(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            kind: HandlerKind::Classic,
            body_content: BodyContent::Template,
            attributes: Vec::new(),
            variables: Vec::new(),
            lifecycle: Lifecycle::tag(),
            dynamic_attributes: false,
            scope: InstanceScope::Dispatch,
        }
    }

    pub fn simple(class_name: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::Simple,
            body_content: BodyContent::Scriptless,
            lifecycle: Lifecycle::default(),
            ..Self::classic(class_name)
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeInfo) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_variable(mut self, variable: VariableInfo) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_body_content(mut self, body_content: BodyContent) -> Self {
        self.body_content = body_content;
        self
    }

    pub fn with_dynamic_attributes(mut self) -> Self {
        self.dynamic_attributes = true;
        self
    }

    pub fn with_scope(mut self, scope: InstanceScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn is_simple(&self) -> bool {
        self.kind == HandlerKind::Simple
    }
}

/// Errors raised while loading a tag library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("invalid tag library JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("handler <{qname}>: {reason}")]
    InvalidHandler { qname: String, reason: String },
}

/// Qualified element name → handler type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagLibrary {
    handlers: BTreeMap<String, HandlerType>,
}

impl TagLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `qname`.
    pub fn insert(&mut self, qname: impl Into<String>, handler: HandlerType) {
        self.handlers.insert(qname.into(), handler);
    }

    pub fn with(mut self, qname: impl Into<String>, handler: HandlerType) -> Self {
        self.insert(qname, handler);
        self
    }

    pub fn get(&self, qname: &str) -> Option<&HandlerType> {
        self.handlers.get(qname)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Load and check a library from JSON.
    pub fn from_json(json: &str) -> Result<Self, LibraryError> {
        let library: TagLibrary = serde_json::from_str(json)?;
        library.check()?;
        Ok(library)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Metadata consistency: unique attribute names, every variable named
    /// exactly one way, attribute-named variables pointing at a real attribute.
    pub fn check(&self) -> Result<(), LibraryError> {
        for (qname, handler) in &self.handlers {
            let invalid = |reason: String| LibraryError::InvalidHandler {
                qname: qname.clone(),
                reason,
            };
            for (i, attr) in handler.attributes.iter().enumerate() {
                if handler.attributes[..i].iter().any(|a| a.name == attr.name) {
                    return Err(invalid(format!("attribute '{}' declared twice", attr.name)));
                }
            }
            for var in &handler.variables {
                match (&var.name_given, &var.name_from_attribute) {
                    (Some(_), None) => {}
                    (None, Some(attr)) => {
                        if handler.attribute(attr).is_none() {
                            return Err(invalid(format!(
                                "variable named by unknown attribute '{attr}'"
                            )));
                        }
                    }
                    _ => {
                        return Err(invalid(
                            "variable needs exactly one of name_given and name_from_attribute"
                                .into(),
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Introspection
// ══════════════════════════════════════════════════════════════════════════════

/// Setter resolved for one attribute of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Setter {
    pub method: String,
    pub target: TargetType,
    pub rtexpr: bool,
    pub deferred_value: Option<String>,
    pub deferred_method: Option<String>,
}

impl Setter {
    /// `setDynamicAttribute(uri, name, value)`.
    pub fn dynamic() -> Self {
        Self {
            method: "setDynamicAttribute".into(),
            target: TargetType::Object,
            rtexpr: true,
            deferred_value: None,
            deferred_method: None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.method == "setDynamicAttribute"
    }
}

/// Handler-type introspection consumed by the code generator.
pub trait Introspector {
    /// Resolve a qualified element name.
    fn handler(&self, qname: &str) -> Option<&HandlerType>;

    /// Setter for `attribute`, or `None` when the class cannot accept it.
    fn setter(&self, handler: &HandlerType, attribute: &str) -> Option<Setter> {
        match handler.attribute(attribute) {
            Some(info) if info.writable => Some(Setter {
                method: info.setter_name(),
                target: info.target.clone(),
                rtexpr: info.rtexpr,
                deferred_value: info.deferred_value.clone(),
                deferred_method: info.deferred_method.clone(),
            }),
            Some(_) => None,
            None if handler.dynamic_attributes => Some(Setter::dynamic()),
            None => None,
        }
    }
}

impl Introspector for TagLibrary {
    fn handler(&self, qname: &str) -> Option<&HandlerType> {
        self.get(qname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Primitive;

    fn library() -> TagLibrary {
        TagLibrary::new().with(
            "x:loop",
            HandlerType::classic("demo.LoopTag")
                .with_attribute(AttributeInfo::new("count", TargetType::Primitive(Primitive::Int)).required())
                .with_attribute(AttributeInfo::new("var", TargetType::String).literal_only())
                .with_attribute(AttributeInfo::new("hidden", TargetType::String).read_only())
                .with_variable(VariableInfo::from_attribute(
                    "var",
                    TargetType::Boxed(Primitive::Int),
                    VariableScope::Nested,
                ))
                .with_lifecycle(Lifecycle::iteration()),
        )
    }

    #[test]
    fn test_bean_setter() {
        assert_eq!(bean_setter("value"), "setValue");
        assert_eq!(bean_setter("x"), "setX");
    }

    #[test]
    fn test_setter_resolution() {
        let lib = library();
        let handler = lib.handler("x:loop").unwrap();
        let setter = lib.setter(handler, "count").unwrap();
        assert_eq!(setter.method, "setCount");
        assert_eq!(setter.target, TargetType::Primitive(Primitive::Int));
        assert!(lib.setter(handler, "hidden").is_none());
        assert!(lib.setter(handler, "missing").is_none());
    }

    #[test]
    fn test_dynamic_setter() {
        let handler = HandlerType::classic("demo.Any").with_dynamic_attributes();
        let setter = TagLibrary::new().setter(&handler, "whatever").unwrap();
        assert!(setter.is_dynamic());
    }

    #[test]
    fn test_lifecycle_outcomes() {
        assert_eq!(Lifecycle::empty_tag().start_outcomes(), 1);
        assert_eq!(Lifecycle::tag().start_outcomes(), 2);
        assert_eq!(Lifecycle::body_tag().start_outcomes(), 3);
        assert_eq!(Lifecycle::tag().end_outcomes(), 2);
    }

    #[test]
    fn test_json_round_trip_and_defaults() {
        let json = r#"{
            "x:hello": {
                "class_name": "demo.HelloTag",
                "attributes": [{ "name": "name", "required": true }]
            }
        }"#;
        let lib = TagLibrary::from_json(json).unwrap();
        let hello = lib.get("x:hello").unwrap();
        assert_eq!(hello.kind, HandlerKind::Classic);
        assert_eq!(hello.lifecycle, Lifecycle::tag());
        assert_eq!(hello.attributes[0].target, TargetType::String);
        assert!(hello.attributes[0].rtexpr);

        let again = TagLibrary::from_json(&library().to_json()).unwrap();
        assert_eq!(again, library());
    }

    #[test]
    fn test_check_rejects_bad_variable() {
        let lib = TagLibrary::new().with(
            "x:bad",
            HandlerType::classic("demo.Bad").with_variable(VariableInfo::from_attribute(
                "nope",
                TargetType::Object,
                VariableScope::AtEnd,
            )),
        );
        let err = lib.check().unwrap_err();
        assert!(err.to_string().contains("unknown attribute 'nope'"));
    }
}
