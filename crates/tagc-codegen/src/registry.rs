//! Tag-instance registry: structural identity and reuse of handler objects.
//!
//! Identity is (registry scope, parent instance, qualified name,
//! attribute-name set, body-buffering flag). Each fragment routine is its own
//! scope, so instances never cross method boundaries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tagc_types::{Document, HandlerKind, InstanceScope, NodeId};

use crate::escape::identifier_part;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TagInstanceId(pub u32);

/// Method an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryScope {
    Page,
    Fragment(u32),
}

/// One logical handler allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagInstance {
    /// Generated identifier: local variable, state field and getter suffix.
    pub id: String,
    pub class_name: String,
    pub kind: HandlerKind,
    pub scope: InstanceScope,
    pub registry_scope: RegistryScope,
    pub parent: Option<TagInstanceId>,
    pub qname: String,
    pub attribute_names: BTreeSet<String>,
    pub has_body_content: bool,
    /// Every value seen per attribute, one entry per occurrence.
    pub values: BTreeMap<String, Vec<String>>,
    pub occurrences: u32,
}

impl TagInstance {
    /// Per-dispatch classic instances live in the pooled state.
    pub fn is_pooled(&self) -> bool {
        self.kind == HandlerKind::Classic && self.scope == InstanceScope::Dispatch
    }

    pub fn is_template_scoped(&self) -> bool {
        self.kind == HandlerKind::Classic && self.scope == InstanceScope::Template
    }
}

/// Everything the registry needs to know about one element occurrence.
#[derive(Debug, Clone)]
pub struct InstanceRequest<'a> {
    pub node: NodeId,
    pub scope: RegistryScope,
    pub parent: Option<TagInstanceId>,
    pub qname: &'a str,
    pub class_name: &'a str,
    pub kind: HandlerKind,
    pub instance_scope: InstanceScope,
    /// Attribute values on this occurrence, by name.
    pub attributes: BTreeMap<String, String>,
    pub has_body_content: bool,
    /// Reuse enabled for this element at all.
    pub reuse_allowed: bool,
}

/// Outcome of the backward sibling walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Found,
    Blocked,
    Exhausted,
}

/// A scripting primitive at `node` or anywhere below it.
fn has_scripting(doc: &Document, node: NodeId) -> bool {
    doc.kind(node).is_scripting() || doc.find_scripting(node).is_some()
}

#[derive(Debug, Default)]
pub struct TagRegistry {
    instances: Vec<TagInstance>,
    bindings: HashMap<NodeId, TagInstanceId>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `request.node` to an instance. Returns the instance and whether
    /// it is a new declaration the caller must emit storage for.
    pub fn find_or_create(
        &mut self,
        doc: &Document,
        request: InstanceRequest<'_>,
    ) -> (TagInstanceId, bool) {
        let names: BTreeSet<String> = request.attributes.keys().cloned().collect();

        let candidate = if request.reuse_allowed && request.kind == HandlerKind::Classic {
            self.instances.iter().position(|inst| {
                inst.registry_scope == request.scope
                    && inst.parent == request.parent
                    && inst.qname == request.qname
                    && inst.attribute_names == names
                    && inst.has_body_content == request.has_body_content
            })
        } else {
            None
        };

        if let Some(idx) = candidate {
            let id = TagInstanceId(idx as u32);
            if self.reachable_without_scripting(doc, request.node, id) {
                tracing::debug!(
                    node = request.node.0,
                    instance = %self.instances[idx].id,
                    "reusing tag instance"
                );
                self.bindings.insert(request.node, id);
                self.merge(id, request.attributes);
                return (id, false);
            }
            tracing::debug!(
                node = request.node.0,
                "scripting between occurrences, declaring a new tag instance"
            );
        }

        let id = TagInstanceId(self.instances.len() as u32);
        let local = request
            .qname
            .rsplit_once(':')
            .map(|(_, local)| local)
            .unwrap_or(request.qname);
        self.instances.push(TagInstance {
            id: format!("_tpl_{}_{}", identifier_part(local), id.0),
            class_name: request.class_name.to_string(),
            kind: request.kind,
            scope: request.instance_scope,
            registry_scope: request.scope,
            parent: request.parent,
            qname: request.qname.to_string(),
            attribute_names: names,
            has_body_content: request.has_body_content,
            values: BTreeMap::new(),
            occurrences: 0,
        });
        self.bindings.insert(request.node, id);
        self.merge(id, request.attributes);
        (id, true)
    }

    fn merge(&mut self, id: TagInstanceId, attributes: BTreeMap<String, String>) {
        let inst = &mut self.instances[id.0 as usize];
        inst.occurrences += 1;
        for (name, value) in attributes {
            inst.values.entry(name).or_default().push(value);
        }
    }

    /// Walk back over `node`'s siblings: scripting in or under a sibling up
    /// to and including the previous occurrence of `id` forbids reuse;
    /// reaching the first sibling allows it.
    fn reachable_without_scripting(&self, doc: &Document, node: NodeId, id: TagInstanceId) -> bool {
        self.previous_occurrence(doc, node, id) != Walk::Blocked
    }

    /// Whether the instance bound to `node` is already retrieved earlier in
    /// the same block, so the retrieval call can be skipped.
    pub fn is_declared(&self, doc: &Document, node: NodeId) -> bool {
        match self.bindings.get(&node) {
            Some(&id) => self.previous_occurrence(doc, node, id) == Walk::Found,
            None => false,
        }
    }

    fn previous_occurrence(&self, doc: &Document, node: NodeId, id: TagInstanceId) -> Walk {
        for sibling in doc.preceding_siblings(node) {
            if has_scripting(doc, sibling) {
                return Walk::Blocked;
            }
            if self.bindings.get(&sibling) == Some(&id) {
                return Walk::Found;
            }
        }
        Walk::Exhausted
    }

    pub fn binding(&self, node: NodeId) -> Option<TagInstanceId> {
        self.bindings.get(&node).copied()
    }

    pub fn get(&self, id: TagInstanceId) -> &TagInstance {
        &self.instances[id.0 as usize]
    }

    pub fn instances(&self) -> &[TagInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagc_types::DocumentBuilder;

    fn request(node: NodeId, value: &str) -> InstanceRequest<'static> {
        InstanceRequest {
            node,
            scope: RegistryScope::Page,
            parent: None,
            qname: "x:hello",
            class_name: "demo.HelloTag",
            kind: HandlerKind::Classic,
            instance_scope: InstanceScope::Dispatch,
            attributes: BTreeMap::from([("name".to_string(), value.to_string())]),
            has_body_content: false,
            reuse_allowed: true,
        }
    }

    #[test]
    fn identical_siblings_share_one_instance() {
        let mut b = DocumentBuilder::named("index.tpl");
        let first = b.empty_element("x:hello", "urn:x", &[("name", "a")], 1);
        let second = b.empty_element("x:hello", "urn:x", &[("name", "b")], 2);
        let doc = b.finish().unwrap();

        let mut registry = TagRegistry::new();
        let (a, new_a) = registry.find_or_create(&doc, request(first, "a"));
        let (b, new_b) = registry.find_or_create(&doc, request(second, "b"));
        assert!(new_a);
        assert!(!new_b);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(a).occurrences, 2);
        assert_eq!(registry.get(a).values["name"], vec!["a", "b"]);
        assert!(!registry.is_declared(&doc, first));
        assert!(registry.is_declared(&doc, second));
    }

    #[test]
    fn scripting_between_occurrences_breaks_reuse() {
        let mut b = DocumentBuilder::named("index.tpl");
        let first = b.empty_element("x:hello", "urn:x", &[("name", "a")], 1);
        b.scriptlet("if (done) return;", 2);
        let second = b.empty_element("x:hello", "urn:x", &[("name", "a")], 3);
        let doc = b.finish().unwrap();

        let mut registry = TagRegistry::new();
        let (a, _) = registry.find_or_create(&doc, request(first, "a"));
        let (b, new_b) = registry.find_or_create(&doc, request(second, "a"));
        assert!(new_b);
        assert_ne!(a, b);
        assert!(!registry.is_declared(&doc, second));
    }

    #[test]
    fn scripting_nested_in_a_sibling_breaks_reuse() {
        let mut b = DocumentBuilder::named("index.tpl");
        let first = b.empty_element("x:hello", "urn:x", &[("name", "a")], 1);
        b.open_element("x:box", "urn:x", &[], 2);
        b.text("<p>", 2);
        b.script_expression("count", 3);
        b.close(4).unwrap();
        let second = b.empty_element("x:hello", "urn:x", &[("name", "a")], 5);
        let doc = b.finish().unwrap();

        let mut registry = TagRegistry::new();
        let (a, _) = registry.find_or_create(&doc, request(first, "a"));
        let (b, new_b) = registry.find_or_create(&doc, request(second, "a"));
        assert!(new_b);
        assert_ne!(a, b);
        assert!(!registry.is_declared(&doc, second));
    }

    #[test]
    fn scripting_inside_the_previous_occurrence_breaks_reuse() {
        let mut b = DocumentBuilder::named("index.tpl");
        let first = b.open_element("x:hello", "urn:x", &[("name", "a")], 1);
        b.scriptlet("i++;", 2);
        b.close(3).unwrap();
        let second = b.empty_element("x:hello", "urn:x", &[("name", "a")], 4);
        let doc = b.finish().unwrap();

        let mut registry = TagRegistry::new();
        registry.find_or_create(&doc, request(first, "a"));
        let (_, new_b) = registry.find_or_create(&doc, request(second, "a"));
        assert!(new_b);
    }

    #[test]
    fn reuse_disabled_always_declares() {
        let mut b = DocumentBuilder::named("index.tpl");
        let first = b.empty_element("x:hello", "urn:x", &[("name", "a")], 1);
        let second = b.empty_element("x:hello", "urn:x", &[("name", "a")], 2);
        let doc = b.finish().unwrap();

        let mut registry = TagRegistry::new();
        registry.find_or_create(&doc, request(first, "a"));
        let mut req = request(second, "a");
        req.reuse_allowed = false;
        let (_, is_new) = registry.find_or_create(&doc, req);
        assert!(is_new);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.instances()[1].id, "_tpl_hello_1");
    }

    #[test]
    fn different_attribute_sets_are_distinct() {
        let mut b = DocumentBuilder::named("index.tpl");
        let first = b.empty_element("x:hello", "urn:x", &[("name", "a")], 1);
        let second = b.empty_element("x:hello", "urn:x", &[], 2);
        let doc = b.finish().unwrap();

        let mut registry = TagRegistry::new();
        registry.find_or_create(&doc, request(first, "a"));
        let mut req = request(second, "a");
        req.attributes.clear();
        let (_, is_new) = registry.find_or_create(&doc, req);
        assert!(is_new);
    }
}
