//! Setter parameter types the expression compiler coerces values into.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive value kinds of the target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
}

impl Primitive {
    /// Keyword form (`int`).
    pub fn keyword(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Char => "char",
        }
    }

    /// Wrapper class (`java.lang.Integer`).
    pub fn boxed_class(self) -> &'static str {
        match self {
            Primitive::Boolean => "java.lang.Boolean",
            Primitive::Byte => "java.lang.Byte",
            Primitive::Short => "java.lang.Short",
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
            Primitive::Char => "java.lang.Character",
        }
    }

    /// Value a variable of this type starts with.
    pub fn zero(self) -> &'static str {
        match self {
            Primitive::Boolean => "false",
            Primitive::Char => "'\\0'",
            Primitive::Long => "0L",
            Primitive::Float => "0.0f",
            Primitive::Double => "0.0",
            _ => "0",
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Primitive::Byte | Primitive::Short | Primitive::Int | Primitive::Long
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double)
    }

    const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Short,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
        Primitive::Char,
    ];
}

/// Declared type of a setter parameter or variable binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetType {
    Primitive(Primitive),
    Boxed(Primitive),
    String,
    Object,
    BigInteger,
    BigDecimal,
    /// Deferred value carrier.
    ValueExpression,
    /// Deferred method carrier.
    MethodExpression,
    /// Deferred body, invoked by the handler.
    Fragment,
    /// Any other reference type, by class name.
    Class(String),
}

impl TargetType {
    /// Resolve a type name as written in handler metadata.
    ///
    /// Accepts primitive keywords, simple and qualified names of the
    /// well-known classes, and any other class name verbatim.
    pub fn parse(name: &str) -> Result<Self, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("empty type name".into());
        }
        if let Some(p) = Primitive::ALL.iter().find(|p| p.keyword() == name) {
            return Ok(TargetType::Primitive(*p));
        }
        let simple = name.strip_prefix("java.lang.").unwrap_or(name);
        if let Some(p) = Primitive::ALL.iter().find(|p| {
            p.boxed_class().strip_prefix("java.lang.") == Some(simple)
        }) {
            return Ok(TargetType::Boxed(*p));
        }
        Ok(match name {
            "String" | "java.lang.String" => TargetType::String,
            "Object" | "java.lang.Object" => TargetType::Object,
            "java.math.BigInteger" | "BigInteger" => TargetType::BigInteger,
            "java.math.BigDecimal" | "BigDecimal" => TargetType::BigDecimal,
            "javax.el.ValueExpression" | "ValueExpression" => TargetType::ValueExpression,
            "javax.el.MethodExpression" | "MethodExpression" => TargetType::MethodExpression,
            "javax.servlet.jsp.tagext.JspFragment" | "JspFragment" | "fragment" => {
                TargetType::Fragment
            }
            other => {
                if !other
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '$' | '[' | ']'))
                {
                    return Err(format!("'{other}' is not a type name"));
                }
                TargetType::Class(other.to_string())
            }
        })
    }

    /// Name usable in generated declarations and casts.
    pub fn class_name(&self) -> String {
        match self {
            TargetType::Primitive(p) => p.keyword().to_string(),
            TargetType::Boxed(p) => p.boxed_class().to_string(),
            TargetType::String => "java.lang.String".into(),
            TargetType::Object => "java.lang.Object".into(),
            TargetType::BigInteger => "java.math.BigInteger".into(),
            TargetType::BigDecimal => "java.math.BigDecimal".into(),
            TargetType::ValueExpression => "javax.el.ValueExpression".into(),
            TargetType::MethodExpression => "javax.el.MethodExpression".into(),
            TargetType::Fragment => "javax.servlet.jsp.tagext.JspFragment".into(),
            TargetType::Class(name) => name.clone(),
        }
    }

    /// Initial value for a pre-declared variable of this type.
    pub fn zero_value(&self) -> &'static str {
        match self {
            TargetType::Primitive(p) => p.zero(),
            _ => "null",
        }
    }

    pub fn is_deferred_carrier(&self) -> bool {
        matches!(self, TargetType::ValueExpression | TargetType::MethodExpression)
    }
}

impl TryFrom<String> for TargetType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TargetType::parse(&value)
    }
}

impl From<TargetType> for String {
    fn from(value: TargetType) -> Self {
        value.class_name()
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name())
    }
}
