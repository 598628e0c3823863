//! Built-in control elements with a compiled fast path.
//!
//! The table is keyed by (namespace URI, local name) and built once; the
//! compiler receives it by reference and never mutates it.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::ElementName;

pub const CORE_URI: &str = "http://java.sun.com/jsp/jstl/core";
pub const CORE_EL_URI: &str = "http://java.sun.com/jstl/core";
pub const CORE_RT_URI: &str = "http://java.sun.com/jstl/core_rt";

/// Control constructs the code generator emits inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    If,
    Choose,
    When,
    Otherwise,
    ForEach,
    Out,
    Set,
    Remove,
    Catch,
}

/// Attribute accepted by a built-in element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinAttribute {
    pub name: &'static str,
    pub required: bool,
    /// Whether `${}` values are accepted.
    pub rtexpr: bool,
}

const fn attr(name: &'static str, required: bool, rtexpr: bool) -> BuiltinAttribute {
    BuiltinAttribute {
        name,
        required,
        rtexpr,
    }
}

/// A built-in element: its kind and accepted attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinSpec {
    pub kind: ControlKind,
    pub attributes: &'static [BuiltinAttribute],
    /// Whether the element may have body content.
    pub body: bool,
}

impl BuiltinSpec {
    pub fn attribute(&self, name: &str) -> Option<&BuiltinAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

const IF: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::If,
    attributes: &[
        attr("test", true, true),
        attr("var", false, false),
        attr("scope", false, false),
    ],
    body: true,
};

const CHOOSE: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::Choose,
    attributes: &[],
    body: true,
};

const WHEN: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::When,
    attributes: &[attr("test", true, true)],
    body: true,
};

const OTHERWISE: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::Otherwise,
    attributes: &[],
    body: true,
};

const FOR_EACH: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::ForEach,
    attributes: &[
        attr("items", false, true),
        attr("begin", false, true),
        attr("end", false, true),
        attr("step", false, true),
        attr("var", false, false),
        attr("varStatus", false, false),
    ],
    body: true,
};

const OUT: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::Out,
    attributes: &[
        attr("value", true, true),
        attr("default", false, true),
        attr("escapeXml", false, true),
    ],
    body: true,
};

const SET: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::Set,
    attributes: &[
        attr("var", true, false),
        attr("value", false, true),
        attr("scope", false, false),
    ],
    body: true,
};

const REMOVE: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::Remove,
    attributes: &[attr("var", true, false), attr("scope", false, false)],
    body: false,
};

const CATCH: BuiltinSpec = BuiltinSpec {
    kind: ControlKind::Catch,
    attributes: &[attr("var", false, false)],
    body: true,
};

/// Immutable (namespace, local name) → built-in mapping.
#[derive(Debug, Clone, Default)]
pub struct BuiltinTable {
    entries: BTreeMap<(String, String), BuiltinSpec>,
}

impl BuiltinTable {
    /// No fast paths: every element resolves through the tag library.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The core control elements under each of their namespace URIs.
    pub fn standard() -> &'static BuiltinTable {
        static TABLE: OnceLock<BuiltinTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut entries = BTreeMap::new();
            for uri in [CORE_URI, CORE_EL_URI, CORE_RT_URI] {
                for (local, spec) in [
                    ("if", IF),
                    ("choose", CHOOSE),
                    ("when", WHEN),
                    ("otherwise", OTHERWISE),
                    ("forEach", FOR_EACH),
                    ("out", OUT),
                    ("set", SET),
                    ("remove", REMOVE),
                    ("catch", CATCH),
                ] {
                    entries.insert((uri.to_string(), local.to_string()), spec);
                }
            }
            BuiltinTable { entries }
        })
    }

    pub fn lookup(&self, name: &ElementName) -> Option<&BuiltinSpec> {
        self.entries.get(&(name.uri.clone(), name.local.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_lookup_by_namespace() {
        let table = BuiltinTable::standard();
        let out = ElementName::parse("c:out", CORE_URI);
        assert_eq!(table.lookup(&out).map(|s| s.kind), Some(ControlKind::Out));
        let rt = ElementName::parse("core:forEach", CORE_RT_URI);
        assert_eq!(table.lookup(&rt).map(|s| s.kind), Some(ControlKind::ForEach));
        let other = ElementName::parse("c:out", "urn:mine");
        assert!(table.lookup(&other).is_none());
    }

    #[test]
    fn test_standard_is_shared() {
        assert!(std::ptr::eq(BuiltinTable::standard(), BuiltinTable::standard()));
        assert_eq!(BuiltinTable::standard().len(), 27);
    }

    #[test]
    fn test_empty_table() {
        let table = BuiltinTable::empty();
        assert!(table.lookup(&ElementName::parse("c:if", CORE_URI)).is_none());
    }

    #[test]
    fn test_required_attributes() {
        assert!(IF.attribute("test").unwrap().required);
        assert!(!FOR_EACH.attribute("items").unwrap().required);
        assert!(!SET.attribute("var").unwrap().rtexpr);
    }
}
