//! The template node tree.
//!
//! Nodes live in an arena owned by [`Document`] and refer to each other by
//! [`NodeId`]. The parent link is an index, so upward queries (enclosing
//! element, preceding siblings) are plain walks over the arena.

use serde::{Deserialize, Serialize};

use crate::{ErrorCode, FileId, SourceFile, Span, TemplateError};

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The document root.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Qualified element name plus the namespace its prefix is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementName {
    pub prefix: String,
    pub local: String,
    #[serde(default)]
    pub uri: String,
}

impl ElementName {
    /// Split `prefix:local` and bind it to `uri`.
    pub fn parse(qname: &str, uri: impl Into<String>) -> Self {
        let (prefix, local) = match qname.split_once(':') {
            Some((prefix, local)) => (prefix, local),
            None => ("", qname),
        };
        Self {
            prefix: prefix.to_string(),
            local: local.to_string(),
            uri: uri.into(),
        }
    }

    /// `prefix:local`, or just `local` when unprefixed.
    pub fn qname(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }
}

/// Closed set of node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    /// Static template text.
    Text(String),
    /// `${...}` or `#{...}` embedded in template text.
    Expression(String),
    /// Raw imperative code.
    Scriptlet(String),
    /// Raw expression whose value is printed.
    ScriptExpression(String),
    /// Raw class-level declaration.
    Declaration(String),
    /// Directive such as `page`; its settings are the static attributes.
    Directive(String),
    /// Custom or built-in element.
    Element(ElementName),
    /// An element attribute supplied as a nested body.
    AttributeBody(String),
    /// Explicit body block of an element.
    Body,
}

impl NodeKind {
    /// Scripting primitives disable instance reuse and are rejected in fragments.
    pub fn is_scripting(&self) -> bool {
        matches!(
            self,
            NodeKind::Scriptlet(_) | NodeKind::ScriptExpression(_) | NodeKind::Declaration(_)
        )
    }

    pub fn is_whitespace_text(&self) -> bool {
        matches!(self, NodeKind::Text(t) if t.trim().is_empty())
    }

    /// Short label for messages.
    pub fn label(&self) -> String {
        match self {
            NodeKind::Root => "document".into(),
            NodeKind::Text(_) => "text".into(),
            NodeKind::Expression(_) => "expression".into(),
            NodeKind::Scriptlet(_) => "scriptlet".into(),
            NodeKind::ScriptExpression(_) => "script expression".into(),
            NodeKind::Declaration(_) => "declaration".into(),
            NodeKind::Directive(name) => format!("<%@ {name} %>"),
            NodeKind::Element(name) => format!("<{}>", name.qname()),
            NodeKind::AttributeBody(name) => format!("attribute body '{name}'"),
            NodeKind::Body => "body".into(),
        }
    }
}

/// An attribute written directly on an element or directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAttribute {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub span: Span,
}

/// A single tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(default)]
    pub span: Span,
    #[serde(default)]
    pub file: FileId,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub attributes: Vec<StaticAttribute>,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span, file: FileId) -> Self {
        Self {
            kind,
            span,
            file,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Look up a static attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&StaticAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn element(&self) -> Option<&ElementName> {
        match &self.kind {
            NodeKind::Element(name) => Some(name),
            _ => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Document
// ══════════════════════════════════════════════════════════════════════════════

/// A finalized template tree. Structurally immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawDocument", into = "RawDocument")]
pub struct Document {
    files: Vec<SourceFile>,
    nodes: Vec<Node>,
    /// Preorder position of every node, indexed by `NodeId`.
    preorder: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct RawDocument {
    files: Vec<SourceFile>,
    nodes: Vec<Node>,
}

impl TryFrom<RawDocument> for Document {
    type Error = String;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        Document::from_parts(raw.files, raw.nodes)
    }
}

impl From<Document> for RawDocument {
    fn from(doc: Document) -> Self {
        RawDocument {
            files: doc.files,
            nodes: doc.nodes,
        }
    }
}

impl Document {
    /// Assemble a document, checking the tree links.
    ///
    /// Node 0 must be the root; every other node must be reachable from it
    /// exactly once and agree with its parent's child list.
    pub fn from_parts(files: Vec<SourceFile>, nodes: Vec<Node>) -> Result<Self, String> {
        if files.is_empty() {
            return Err("document has no source file".into());
        }
        match nodes.first() {
            Some(node) if node.kind == NodeKind::Root && node.parent.is_none() => {}
            _ => return Err("node 0 must be a parentless root".into()),
        }

        let mut preorder = vec![u32::MAX; nodes.len()];
        let mut stack = vec![NodeId::ROOT];
        let mut next = 0u32;
        while let Some(id) = stack.pop() {
            let node = nodes
                .get(id.index())
                .ok_or_else(|| format!("node {} does not exist", id.0))?;
            if preorder[id.index()] != u32::MAX {
                return Err(format!("node {} is attached more than once", id.0));
            }
            if node.file.0 as usize >= files.len() {
                return Err(format!("node {} refers to unknown file {}", id.0, node.file.0));
            }
            preorder[id.index()] = next;
            next += 1;
            for &child in node.children.iter().rev() {
                let child_node = nodes
                    .get(child.index())
                    .ok_or_else(|| format!("node {} does not exist", child.0))?;
                if child_node.parent != Some(id) {
                    return Err(format!(
                        "node {} is listed under {} but its parent is {:?}",
                        child.0, id.0, child_node.parent
                    ));
                }
                stack.push(child);
            }
        }
        if let Some(orphan) = preorder.iter().position(|&p| p == u32::MAX) {
            return Err(format!("node {orphan} is not reachable from the root"));
        }

        Ok(Self {
            files,
            nodes,
            preorder,
        })
    }

    /// Parse a document from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    /// Name of the file a node came from.
    pub fn file_name(&self, id: NodeId) -> &str {
        self.file(self.node(id).file)
            .map(|f| f.name.as_str())
            .unwrap_or("")
    }

    pub fn preorder_index(&self, id: NodeId) -> u32 {
        self.preorder[id.index()]
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Siblings before `id`, nearest first.
    pub fn preceding_siblings(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let siblings: &[NodeId] = match self.parent(id) {
            Some(parent) => self.children(parent),
            None => &[],
        };
        let pos = siblings.iter().position(|&s| s == id).unwrap_or(0);
        siblings[..pos].iter().rev().copied()
    }

    /// Nearest ancestor that is an element.
    pub fn enclosing_element(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&a| matches!(self.kind(a), NodeKind::Element(_)))
    }

    /// All nodes under `id` (excluding `id`) in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// First scripting primitive inside `id`'s subtree, if any.
    pub fn find_scripting(&self, id: NodeId) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&d| self.kind(d).is_scripting())
    }

    /// Source line a node starts on, for error excerpts.
    pub fn excerpt(&self, id: NodeId) -> String {
        let node = self.node(id);
        self.file(node.file)
            .and_then(|f| f.line(node.span.start_line))
            .unwrap_or("")
            .to_string()
    }

    /// Build a located error for `id`.
    pub fn error(&self, id: NodeId, code: ErrorCode, message: impl Into<String>) -> TemplateError {
        TemplateError::new(
            self.file_name(id),
            code,
            message,
            self.node(id).span,
            self.excerpt(id),
        )
    }
}
