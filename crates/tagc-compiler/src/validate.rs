//! Structural validation before code generation.
//!
//! Walks the tree once in document order and stops at the first violation.
//! Generation assumes a tree that passed these checks; it re-checks only
//! what it must to stay total.

use std::collections::BTreeSet;

use tagc_codegen::is_variable_name;
use tagc_types::{
    BodyContent, BuiltinSpec, BuiltinTable, ControlKind, Document, ErrorCode, HandlerType, Introspector, NodeId,
    NodeKind, PageConfig, TemplateError,
};

type Check = Result<(), TemplateError>;

/// Validate every node of `doc` against the library and page settings.
pub fn validate(
    doc: &Document,
    library: &dyn Introspector,
    builtins: &BuiltinTable,
    config: &PageConfig,
) -> Check {
    for id in doc.descendants(doc.root()) {
        match doc.kind(id) {
            NodeKind::Scriptlet(_) | NodeKind::ScriptExpression(_) | NodeKind::Declaration(_) => {
                if config.scripting_invalid {
                    return Err(doc.error(
                        id,
                        ErrorCode::SCRIPTING_NOT_ALLOWED,
                        format!("{} is not allowed when scripting is disabled", doc.kind(id).label()),
                    ));
                }
            }
            NodeKind::AttributeBody(_) | NodeKind::Body => {
                let in_element = doc
                    .parent(id)
                    .is_some_and(|p| matches!(doc.kind(p), NodeKind::Element(_)));
                if !in_element {
                    return Err(doc.error(
                        id,
                        ErrorCode::MISPLACED_ELEMENT,
                        format!("{} must be a direct child of an element", doc.kind(id).label()),
                    ));
                }
            }
            NodeKind::Element(name) => {
                check_attribute_shape(doc, id)?;
                check_body_shape(doc, id)?;
                if let Some(spec) = builtins.lookup(name) {
                    check_builtin(doc, id, spec, builtins)?;
                } else if let Some(handler) = library.handler(&name.qname()) {
                    check_handler(doc, id, handler, library)?;
                } else {
                    return Err(doc.error(
                        id,
                        ErrorCode::UNKNOWN_ELEMENT,
                        format!("no handler is registered for {}", doc.kind(id).label()),
                    ));
                }
            }
            NodeKind::Root | NodeKind::Text(_) | NodeKind::Expression(_) | NodeKind::Directive(_) => {}
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Element shape
// ══════════════════════════════════════════════════════════════════════════════

/// Attribute names present on an element: static ones, then nested bodies.
fn attribute_names(doc: &Document, id: NodeId) -> Vec<String> {
    let node = doc.node(id);
    node.attributes
        .iter()
        .map(|a| a.name.clone())
        .chain(doc.children(id).iter().filter_map(|&c| match doc.kind(c) {
            NodeKind::AttributeBody(name) => Some(name.clone()),
            _ => None,
        }))
        .collect()
}

fn check_attribute_shape(doc: &Document, id: NodeId) -> Check {
    let mut seen = BTreeSet::new();
    for name in attribute_names(doc, id) {
        if !seen.insert(name.clone()) {
            return Err(doc.error(
                id,
                ErrorCode::DUPLICATE_ATTRIBUTE,
                format!("attribute '{name}' is given more than once"),
            ));
        }
    }
    Ok(())
}

/// Content children: everything except nested attribute bodies.
fn content(doc: &Document, id: NodeId) -> Vec<NodeId> {
    doc.children(id)
        .iter()
        .copied()
        .filter(|&c| !matches!(doc.kind(c), NodeKind::AttributeBody(_)))
        .collect()
}

fn check_body_shape(doc: &Document, id: NodeId) -> Check {
    let children = doc.children(id);
    let bodies = children
        .iter()
        .filter(|&&c| matches!(doc.kind(c), NodeKind::Body))
        .count();
    if bodies > 1 {
        return Err(doc.error(id, ErrorCode::MULTIPLE_BODIES, "an element may have only one body"));
    }
    let has_attribute_bodies = children
        .iter()
        .any(|&c| matches!(doc.kind(c), NodeKind::AttributeBody(_)));
    let loose = children.iter().any(|&c| {
        !matches!(doc.kind(c), NodeKind::AttributeBody(_) | NodeKind::Body) && !doc.kind(c).is_whitespace_text()
    });
    if loose && (bodies == 1 || has_attribute_bodies) {
        return Err(doc.error(
            id,
            ErrorCode::MULTIPLE_BODIES,
            "content next to nested attributes must be inside an explicit body",
        ));
    }
    Ok(())
}

/// Content with an explicit body block flattened into its children.
fn body_nodes(doc: &Document, id: NodeId) -> Vec<NodeId> {
    content(doc, id)
        .into_iter()
        .flat_map(|c| match doc.kind(c) {
            NodeKind::Body => doc.children(c).to_vec(),
            _ => vec![c],
        })
        .collect()
}

/// Whether the element has content other than whitespace.
fn has_body(doc: &Document, id: NodeId) -> bool {
    body_nodes(doc, id)
        .into_iter()
        .any(|c| !doc.kind(c).is_whitespace_text())
}

// ══════════════════════════════════════════════════════════════════════════════
// Handlers
// ══════════════════════════════════════════════════════════════════════════════

fn check_handler(doc: &Document, id: NodeId, handler: &HandlerType, library: &dyn Introspector) -> Check {
    let names = attribute_names(doc, id);
    for name in &names {
        if library.setter(handler, name).is_none() {
            return Err(match handler.attribute(name) {
                Some(_) => doc.error(
                    id,
                    ErrorCode::NO_SETTER,
                    format!("{} has no setter for attribute '{name}'", handler.class_name),
                ),
                None => doc.error(id, ErrorCode::UNKNOWN_ATTRIBUTE, format!("unknown attribute '{name}'")),
            });
        }
    }
    for attr in handler.attributes.iter().filter(|a| a.required) {
        if !names.contains(&attr.name) {
            return Err(doc.error(
                id,
                ErrorCode::MISSING_REQUIRED_ATTRIBUTE,
                format!("{} requires attribute '{}'", doc.kind(id).label(), attr.name),
            ));
        }
    }

    match handler.body_content {
        BodyContent::Empty if has_body(doc, id) => {
            return Err(doc.error(
                id,
                ErrorCode::CONTENT_NOT_ALLOWED,
                format!("{} must be empty", doc.kind(id).label()),
            ));
        }
        BodyContent::Scriptless => {
            for child in body_nodes(doc, id) {
                let found = if doc.kind(child).is_scripting() {
                    Some(child)
                } else {
                    doc.find_scripting(child)
                };
                if let Some(script) = found {
                    return Err(doc.error(
                        script,
                        ErrorCode::SCRIPTING_NOT_ALLOWED,
                        format!("{} is not allowed in the body of {}", doc.kind(script).label(), doc.kind(id).label()),
                    ));
                }
            }
        }
        _ => {}
    }

    let node = doc.node(id);
    for var in &handler.variables {
        let Some(attr) = &var.name_from_attribute else {
            continue;
        };
        if let Some(a) = node.attribute(attr) {
            if !is_variable_name(&a.value) {
                return Err(doc.error(
                    id,
                    ErrorCode::INVALID_VARIABLE_NAME,
                    format!("'{}' is not a valid variable name", a.value),
                ));
            }
        } else if names.contains(attr) {
            return Err(doc.error(
                id,
                ErrorCode::INVALID_VARIABLE_NAME,
                format!("attribute '{attr}' names a variable and must be a literal"),
            ));
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Built-ins
// ══════════════════════════════════════════════════════════════════════════════

fn check_builtin(doc: &Document, id: NodeId, spec: &BuiltinSpec, builtins: &BuiltinTable) -> Check {
    let label = doc.kind(id).label();
    let names = attribute_names(doc, id);
    if let Some(name) = names.iter().find(|n| spec.attribute(n).is_none()) {
        return Err(doc.error(id, ErrorCode::UNKNOWN_ATTRIBUTE, format!("{label} has no attribute '{name}'")));
    }
    if let Some(attr) = spec.attributes.iter().find(|a| a.required && !names.iter().any(|n| n == a.name)) {
        return Err(doc.error(
            id,
            ErrorCode::MISSING_REQUIRED_ATTRIBUTE,
            format!("{label} requires attribute '{}'", attr.name),
        ));
    }
    if !spec.body && has_body(doc, id) {
        return Err(doc.error(id, ErrorCode::CONTENT_NOT_ALLOWED, format!("{label} must be empty")));
    }

    let builtin_kind = |node: NodeId| match doc.kind(node) {
        NodeKind::Element(name) => builtins.lookup(name).map(|s| s.kind),
        _ => None,
    };
    match spec.kind {
        ControlKind::When | ControlKind::Otherwise => {
            let parent = doc
                .parent(id)
                .map(|p| match doc.kind(p) {
                    NodeKind::Body => doc.parent(p).unwrap_or(p),
                    _ => p,
                })
                .and_then(|p| builtin_kind(p));
            if parent != Some(ControlKind::Choose) {
                return Err(doc.error(
                    id,
                    ErrorCode::MISPLACED_ELEMENT,
                    format!("{label} must be a direct child of choose"),
                ));
            }
        }
        ControlKind::Choose => {
            let mut branches = 0;
            let mut seen_otherwise = false;
            for child in body_nodes(doc, id) {
                match builtin_kind(child) {
                    Some(ControlKind::When | ControlKind::Otherwise) if seen_otherwise => {
                        return Err(doc.error(
                            child,
                            ErrorCode::MISPLACED_ELEMENT,
                            "otherwise must be the last branch of choose",
                        ));
                    }
                    Some(kind @ (ControlKind::When | ControlKind::Otherwise)) => {
                        seen_otherwise = kind == ControlKind::Otherwise;
                        branches += 1;
                    }
                    _ if doc.kind(child).is_whitespace_text() => {}
                    _ => {
                        return Err(doc.error(
                            child,
                            ErrorCode::CONTENT_NOT_ALLOWED,
                            format!("{} is not allowed inside choose", doc.kind(child).label()),
                        ));
                    }
                }
            }
            if branches == 0 {
                return Err(doc.error(id, ErrorCode::BODY_REQUIRED, "choose needs at least one when"));
            }
        }
        _ => {}
    }
    Ok(())
}
