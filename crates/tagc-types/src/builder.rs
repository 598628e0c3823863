//! Programmatic construction of a [`Document`].
//!
//! Stands in for the markup parser: callers open and close containers in
//! document order and the builder wires parent/child links.

use crate::document::{Document, ElementName, Node, NodeId, NodeKind, StaticAttribute};
use crate::{ErrorCode, FileId, SourceFile, Span, TemplateError};

/// Incremental document builder.
pub struct DocumentBuilder {
    files: Vec<SourceFile>,
    nodes: Vec<Node>,
    /// Open containers, innermost last. The root is always at the bottom.
    open: Vec<NodeId>,
    file: FileId,
}

impl DocumentBuilder {
    /// Start a document for `file`.
    pub fn new(file: SourceFile) -> Self {
        let lines = file.line_count() as u32;
        Self {
            files: vec![file],
            nodes: vec![Node::new(NodeKind::Root, Span::lines(1, lines), FileId(0))],
            open: vec![NodeId::ROOT],
            file: FileId(0),
        }
    }

    /// Start a document with only a file name; excerpts will be empty.
    pub fn named(name: &str) -> Self {
        Self::new(SourceFile::new(name, ""))
    }

    /// Register another source file (an included fragment) and make
    /// subsequent nodes belong to it.
    pub fn enter_file(&mut self, file: SourceFile) -> FileId {
        let id = FileId(self.files.len() as u16);
        self.files.push(file);
        self.file = id;
        id
    }

    /// Switch the file subsequent nodes are attributed to.
    pub fn set_file(&mut self, file: FileId) {
        self.file = file;
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(NodeId::ROOT)
    }

    fn push(&mut self, kind: NodeKind, line: u32, attributes: &[(&str, &str)]) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let parent = self.current();
        let mut node = Node::new(kind, Span::lines(line, line), self.file);
        node.parent = Some(parent);
        node.attributes = attributes
            .iter()
            .map(|(name, value)| StaticAttribute {
                name: (*name).to_string(),
                value: (*value).to_string(),
                span: Span::lines(line, line),
            })
            .collect();
        self.nodes.push(node);
        self.nodes[parent.index()].children.push(id);
        id
    }

    // ── Leaves ───────────────────────────────────────────────────────────

    pub fn text(&mut self, text: &str, line: u32) -> NodeId {
        self.push(NodeKind::Text(text.to_string()), line, &[])
    }

    pub fn expression(&mut self, source: &str, line: u32) -> NodeId {
        self.push(NodeKind::Expression(source.to_string()), line, &[])
    }

    pub fn scriptlet(&mut self, code: &str, line: u32) -> NodeId {
        self.push(NodeKind::Scriptlet(code.to_string()), line, &[])
    }

    pub fn script_expression(&mut self, code: &str, line: u32) -> NodeId {
        self.push(NodeKind::ScriptExpression(code.to_string()), line, &[])
    }

    pub fn declaration(&mut self, code: &str, line: u32) -> NodeId {
        self.push(NodeKind::Declaration(code.to_string()), line, &[])
    }

    pub fn directive(&mut self, name: &str, attributes: &[(&str, &str)], line: u32) -> NodeId {
        self.push(NodeKind::Directive(name.to_string()), line, attributes)
    }

    /// An element with no content.
    pub fn empty_element(
        &mut self,
        qname: &str,
        uri: &str,
        attributes: &[(&str, &str)],
        line: u32,
    ) -> NodeId {
        self.push(NodeKind::Element(ElementName::parse(qname, uri)), line, attributes)
    }

    // ── Containers ───────────────────────────────────────────────────────

    pub fn open_element(
        &mut self,
        qname: &str,
        uri: &str,
        attributes: &[(&str, &str)],
        line: u32,
    ) -> NodeId {
        let id = self.empty_element(qname, uri, attributes, line);
        self.open.push(id);
        id
    }

    pub fn open_attribute(&mut self, name: &str, line: u32) -> NodeId {
        let id = self.push(NodeKind::AttributeBody(name.to_string()), line, &[]);
        self.open.push(id);
        id
    }

    pub fn open_body(&mut self, line: u32) -> NodeId {
        let id = self.push(NodeKind::Body, line, &[]);
        self.open.push(id);
        id
    }

    /// Close the innermost open container, recording its end line.
    pub fn close(&mut self, line: u32) -> Result<NodeId, TemplateError> {
        if self.open.len() <= 1 {
            return Err(TemplateError::new(
                self.file_name(),
                ErrorCode::MISPLACED_ELEMENT,
                "close without a matching open element",
                Span::lines(line, line),
                self.line_text(line),
            ));
        }
        let id = self.current();
        self.open.pop();
        self.nodes[id.index()].span.end_line = line;
        Ok(id)
    }

    /// Finish the document. Every opened container must have been closed.
    pub fn finish(self) -> Result<Document, TemplateError> {
        if self.open.len() > 1 {
            let id = self.current();
            let node = &self.nodes[id.index()];
            return Err(TemplateError::new(
                self.file_name(),
                ErrorCode::MISPLACED_ELEMENT,
                format!("{} is never closed", node.kind.label()),
                node.span,
                self.line_text(node.span.start_line),
            ));
        }
        Document::from_parts(self.files, self.nodes).map_err(TemplateError::internal)
    }

    fn file_name(&self) -> String {
        self.files
            .get(self.file.0 as usize)
            .map(|f| f.name.clone())
            .unwrap_or_default()
    }

    fn line_text(&self, line: u32) -> String {
        self.files
            .get(self.file.0 as usize)
            .and_then(|f| f.line(line))
            .unwrap_or("")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_nested_tree() {
        let mut b = DocumentBuilder::named("page.tpl");
        b.text("Hello ", 1);
        let el = b.open_element("x:greet", "urn:x", &[("name", "World")], 1);
        let attr = b.open_attribute("suffix", 2);
        b.text("!", 2);
        b.close(2).unwrap();
        b.close(3).unwrap();
        let doc = b.finish().unwrap();

        assert_eq!(doc.children(doc.root()).len(), 2);
        assert_eq!(doc.parent(attr), Some(el));
        assert_eq!(doc.node(el).attribute("name").unwrap().value, "World");
        assert_eq!(doc.node(el).span.end_line, 3);
    }

    #[test]
    fn test_unclosed_element_is_an_error() {
        let mut b = DocumentBuilder::named("page.tpl");
        b.open_element("x:a", "urn:x", &[], 4);
        let err = b.finish().unwrap_err();
        assert_eq!(err.code, ErrorCode::MISPLACED_ELEMENT);
        assert_eq!(err.span.start_line, 4);
    }

    #[test]
    fn test_stray_close_is_an_error() {
        let mut b = DocumentBuilder::named("page.tpl");
        assert!(b.close(1).is_err());
    }

    #[test]
    fn test_nodes_record_their_file() {
        let mut b = DocumentBuilder::new(SourceFile::new("main.tpl", "a"));
        b.text("a", 1);
        let included = b.enter_file(SourceFile::new("header.tpl", "b"));
        let text = b.text("b", 1);
        let doc = b.finish().unwrap();
        assert_eq!(doc.node(text).file, included);
        assert_eq!(doc.file_name(text), "header.tpl");
        assert_eq!(doc.excerpt(text), "b");
    }
}
