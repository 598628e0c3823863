//! Compiled-unit assembler.
//!
//! Orchestrates the code generation pipeline:
//! 1. Class header, implicit objects and hoisted declarations
//! 2. Page wrapper: context allocation and the exactly-once state release
//! 3. Prologue pass: instance registration and one-time declarations
//! 4. Body pass: document-order generation
//! 5. Class epilogue: fragments, dependencies, tag state, statics, slots, text

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tagc_types::{
    BuiltinSpec, BuiltinTable, Document, ErrorCode, HandlerType, Introspector, NodeId, NodeKind, PageConfig,
    Span, TargetType,
};

use crate::body::{emit_body, emit_prologue};
use crate::error::{CodegenError, CodegenResult};
use crate::escape::java_string;
use crate::fragment::{emit_fragment_class, FragmentTable};
use crate::registry::{RegistryScope, TagInstanceId, TagRegistry};
use crate::runtime::*;
use crate::source_map::LineMap;
use crate::state::{emit_tag_state, emit_template_statics};
use crate::tables::ConstantTables;
use crate::writer::JavaWriter;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// One staleness descriptor of the compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dependency {
    /// A template source file and the SHA-256 digest of its text.
    Path { path: String, digest: String },
    /// An opaque expression the host evaluates to a dependency object.
    Create { expression: String },
}

/// Everything generation reads. Nothing here is mutated.
pub struct CodegenInput<'a> {
    pub document: &'a Document,
    pub library: &'a dyn Introspector,
    pub builtins: &'a BuiltinTable,
    pub config: &'a PageConfig,
    /// Source-file dependencies; handler classes are appended during generation.
    pub dependencies: Vec<Dependency>,
}

/// Summary of one handler allocation, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: String,
    pub class_name: String,
    pub qname: String,
    pub pooled: bool,
    pub occurrences: u32,
    pub values: BTreeMap<String, Vec<String>>,
}

/// Output of one compilation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub class_name: String,
    pub source: String,
    pub line_map: LineMap,
    pub instances: Vec<InstanceSummary>,
    /// Number of fragment-table entries, static ones included.
    pub fragments: usize,
    pub dependencies: Vec<Dependency>,
}

/// Generate the complete source of one compiled unit.
pub fn generate(input: CodegenInput<'_>) -> CodegenResult<CompiledUnit> {
    let mut ctx = GenContext::new(&input);
    let mut out = JavaWriter::new();
    let dependencies = ctx.compile(input.dependencies, &mut out)?;
    let (source, line_map) = out.finish();

    tracing::debug!(
        instances = ctx.registry.len(),
        fragments = ctx.fragments.len(),
        slots = ctx.tables.slots().len(),
        lines = source.lines().count(),
        "generated compiled unit"
    );

    Ok(CompiledUnit {
        class_name: ctx.config.class_name.clone(),
        source,
        line_map,
        instances: ctx
            .registry
            .instances()
            .iter()
            .map(|inst| InstanceSummary {
                id: inst.id.clone(),
                class_name: inst.class_name.clone(),
                qname: inst.qname.clone(),
                pooled: inst.is_pooled(),
                occurrences: inst.occurrences,
                values: inst.values.clone(),
            })
            .collect(),
        fragments: ctx.fragments.len(),
        dependencies,
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Generation context
// ══════════════════════════════════════════════════════════════════════════════

/// How an element is compiled.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Builtin(&'a BuiltinSpec),
    Handler(&'a HandlerType),
    Unknown,
    NotElement,
}

/// An attribute as written on an element: inline text or a nested body.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Static(String),
    Body(NodeId),
}

/// An element split into its attributes and its body content.
#[derive(Debug, Clone)]
pub struct ElementParts {
    pub attributes: Vec<(String, AttrValue, Span)>,
    pub body: Vec<NodeId>,
    /// The explicit body block, when the body was written as one.
    pub body_node: Option<NodeId>,
}

impl ElementParts {
    pub fn of(doc: &Document, id: NodeId) -> Self {
        let node = doc.node(id);
        let mut attributes: Vec<(String, AttrValue, Span)> = node
            .attributes
            .iter()
            .map(|a| (a.name.clone(), AttrValue::Static(a.value.clone()), a.span))
            .collect();
        let mut body = Vec::new();
        let mut body_node = None;
        for &child in &node.children {
            match doc.kind(child) {
                NodeKind::AttributeBody(name) => {
                    attributes.push((name.clone(), AttrValue::Body(child), doc.node(child).span))
                }
                NodeKind::Body => {
                    body_node = Some(child);
                    body = doc.children(child).to_vec();
                }
                _ if body_node.is_none() => body.push(child),
                _ => {}
            }
        }
        Self {
            attributes,
            body,
            body_node,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, v, _)| v)
    }
}

/// Per-method state. A fresh scope is pushed for every fragment routine.
#[derive(Debug, Clone)]
pub struct MethodScope {
    pub registry_scope: RegistryScope,
    /// Node whose content this method generates; upward walks stop here.
    pub root: Option<NodeId>,
    pub in_fragment: bool,
    /// Locals already declared in this method, with their types.
    pub declared: BTreeMap<String, TargetType>,
    /// Fragment indices whose recycling variable is declared in this method.
    pub fragment_vars: BTreeSet<u32>,
}

impl MethodScope {
    pub fn page() -> Self {
        Self {
            registry_scope: RegistryScope::Page,
            root: None,
            in_fragment: false,
            declared: BTreeMap::new(),
            fragment_vars: BTreeSet::new(),
        }
    }
}

/// The per-unit compiler state.
pub struct GenContext<'a> {
    pub doc: &'a Document,
    pub lib: &'a dyn Introspector,
    pub builtins: &'a BuiltinTable,
    pub config: &'a PageConfig,

    // ── Tables ───────────────────────────────────────────────────────────
    pub registry: TagRegistry,
    pub tables: ConstantTables,
    pub fragments: FragmentTable,

    // ── Current method ───────────────────────────────────────────────────
    pub method: MethodScope,
    next_id: u32,
}

impl<'a> GenContext<'a> {
    pub fn new(input: &CodegenInput<'a>) -> Self {
        Self {
            doc: input.document,
            lib: input.library,
            builtins: input.builtins,
            config: input.config,
            registry: TagRegistry::new(),
            tables: ConstantTables::new(),
            fragments: FragmentTable::new(),
            method: MethodScope::page(),
            next_id: 0,
        }
    }

    /// Next value of the unit-wide identifier counter.
    pub fn unique_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id - 1
    }

    pub fn resolve(&self, id: NodeId) -> Resolved<'a> {
        let doc = self.doc;
        let NodeKind::Element(name) = doc.kind(id) else {
            return Resolved::NotElement;
        };
        let builtins = self.builtins;
        if let Some(spec) = builtins.lookup(name) {
            return Resolved::Builtin(spec);
        }
        let lib = self.lib;
        match lib.handler(&name.qname()) {
            Some(handler) => Resolved::Handler(handler),
            None => Resolved::Unknown,
        }
    }

    /// Nearest enclosing handler instance inside the current method.
    pub fn parent_instance(&self, id: NodeId) -> Option<TagInstanceId> {
        for ancestor in self.doc.ancestors(id) {
            if Some(ancestor) == self.method.root {
                return None;
            }
            if let Some(instance) = self.registry.binding(ancestor) {
                return Some(instance);
            }
        }
        None
    }

    /// Expression naming the parent handler of an element occurrence.
    pub fn parent_expr(&self, id: NodeId) -> String {
        match self.parent_instance(id) {
            Some(instance) => self.registry.get(instance).id.clone(),
            None => PARENT_TAG.to_string(),
        }
    }

    /// Statement that abandons the rest of the page.
    pub fn skip_page_statement(&self) -> String {
        if self.method.in_fragment || self.config.is_tag_file {
            format!("throw new {SKIP_PAGE_EXCEPTION}();")
        } else {
            "return;".to_string()
        }
    }

    /// Located error for `id`.
    pub fn error(&self, id: NodeId, code: ErrorCode, message: impl Into<String>) -> CodegenError {
        CodegenError::Template(self.doc.error(id, code, message))
    }

    pub fn set_location(&self, id: NodeId, out: &mut JavaWriter) {
        out.set_location(self.doc.file_name(id), self.doc.node(id).span.start_line);
    }

    pub fn set_end_location(&self, id: NodeId, out: &mut JavaWriter) {
        out.set_location(self.doc.file_name(id), self.doc.node(id).span.end_line);
    }

    // ── Pipeline ─────────────────────────────────────────────────────────

    fn compile(
        &mut self,
        mut dependencies: Vec<Dependency>,
        out: &mut JavaWriter,
    ) -> CodegenResult<Vec<Dependency>> {
        let doc = self.doc;
        let roots = doc.children(doc.root()).to_vec();

        // 1. Header
        self.emit_header(out);

        // 2. Page wrapper
        self.emit_service(out);

        // 3-4. Prologue and body of the page routine
        out.blank();
        out.println(&format!("private void {SERVICE_IMPL}({REQUEST} request,"));
        out.println(&format!("                               {RESPONSE} response,"));
        out.println(&format!("                               {PAGE_CONTEXT} pageContext,"));
        out.println(&format!("                               {STATE_CLASS} {STATE})"));
        out.println("  throws java.lang.Throwable");
        out.open("");
        self.emit_implicit_objects(out);
        emit_prologue(self, &roots, out)?;
        emit_body(self, &roots, out)?;
        out.clear_location();
        out.close("");

        // 5a. Fragment routines; they may register more instances and slots
        emit_fragment_class(self, out)?;
        out.clear_location();

        // 5b. Dependencies
        let mut classes = BTreeSet::new();
        for inst in self.registry.instances() {
            if classes.insert(inst.class_name.clone()) {
                dependencies.push(Dependency::Create {
                    expression: format!("new {RT_CLASS_DEPENDENCY}({})", java_string(&inst.class_name)),
                });
            }
        }
        emit_dependencies(&dependencies, out);

        // 5c. Pooled tag state
        emit_tag_state(self, out);

        // 5d. Template-scoped handlers
        emit_template_statics(self, out);

        // 5e. Evaluator slots
        self.tables.emit_slots(out);

        // 5f. Text constants
        self.tables.emit_strings(out);

        out.close("");
        Ok(dependencies)
    }

    fn emit_header(&self, out: &mut JavaWriter) {
        let config = self.config;
        if let Some(package) = config.package() {
            out.println(&format!("package {package};"));
            out.blank();
        }
        for import in &config.imports {
            out.println(&format!("import {import};"));
        }
        if !config.imports.is_empty() {
            out.blank();
        }
        out.open(&format!(
            "public class {} extends {}",
            config.simple_class_name(),
            config.extends
        ));

        if let Some(info) = &config.info {
            out.println("public java.lang.String getServletInfo()");
            out.open("");
            out.println(&format!("return {};", java_string(info)));
            out.close("");
        }

        let doc = self.doc;
        for id in doc.descendants(doc.root()) {
            if let NodeKind::Declaration(code) = doc.kind(id) {
                out.blank();
                self.set_location(id, out);
                out.println(code.trim());
                out.clear_location();
            }
        }
    }

    fn emit_service(&self, out: &mut JavaWriter) {
        let config = self.config;
        let error_page = config
            .error_page
            .as_deref()
            .map(java_string)
            .unwrap_or_else(|| "null".to_string());

        out.blank();
        out.println(&format!("public void {SERVICE}({REQUEST} request,"));
        out.println(&format!("                        {RESPONSE} response)"));
        out.println(&format!("  throws {IO_EXCEPTION}, {SERVLET_EXCEPTION}"));
        out.open("");
        out.println(&format!(
            "{PAGE_CONTEXT} pageContext = _tpl_allocate(request, response, {error_page}, {}, {}, {});",
            config.session, config.buffer, config.auto_flush
        ));
        out.println(&format!("{STATE_CLASS} {STATE} = new {STATE_CLASS}();"));
        out.blank();
        out.open("try");
        out.println(&format!("{SERVICE_IMPL}(request, response, pageContext, {STATE});"));
        out.pop_depth();
        out.println("} catch (java.lang.Throwable _tpl_e) {");
        out.push_depth();
        out.println(&format!("if (! (_tpl_e instanceof {SKIP_PAGE_EXCEPTION}))"));
        out.println("  pageContext.handlePageException(_tpl_e);");
        out.pop_depth();
        out.println("} finally {");
        out.push_depth();
        out.println(&format!("{STATE}.release();"));
        out.println("_tpl_free(pageContext);");
        out.close("");
        out.close("");
    }

    fn emit_implicit_objects(&self, out: &mut JavaWriter) {
        let config = self.config;
        out.println(&format!("{JSP_WRITER} out = pageContext.getOut();"));
        out.println(&format!("final {EL_CONTEXT} {ENV} = pageContext.getELContext();"));
        out.println("javax.servlet.ServletContext application = pageContext.getServletContext();");
        out.println("javax.servlet.ServletConfig config = pageContext.getServletConfig();");
        out.println("java.lang.Object page = this;");
        if config.session {
            out.println("javax.servlet.http.HttpSession session = pageContext.getSession();");
        }
        if config.is_error_page {
            out.println("java.lang.Throwable exception = pageContext.getException();");
        }
        out.println(&format!("{JSP_TAG} {PARENT_TAG} = null;"));
        if let Some(content_type) = &config.content_type {
            out.println(&format!("response.setContentType({});", java_string(content_type)));
        }
    }
}

/// `_tpl_dependencies()`: the ordered staleness list.
fn emit_dependencies(dependencies: &[Dependency], out: &mut JavaWriter) {
    out.blank();
    out.println(&format!("public java.util.List<{RT_DEPENDENCY}> {DEPENDENCIES}()"));
    out.open("");
    out.println(&format!(
        "java.util.List<{RT_DEPENDENCY}> list = new java.util.ArrayList<{RT_DEPENDENCY}>();"
    ));
    for dep in dependencies {
        match dep {
            Dependency::Path { path, digest } => out.println(&format!(
                "list.add(new {RT_PATH_DEPENDENCY}({}, {}));",
                java_string(path),
                java_string(digest)
            )),
            Dependency::Create { expression } => out.println(&format!("list.add({expression});")),
        }
    }
    out.println("return list;");
    out.close("");
}

/// Error for generator states that validation should have ruled out.
pub fn internal(message: impl Into<String>) -> CodegenError {
    CodegenError::Internal(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagc_types::{DocumentBuilder, TagLibrary};

    fn generate_text(doc: &Document) -> CompiledUnit {
        let library = TagLibrary::new();
        let config = PageConfig::default();
        generate(CodegenInput {
            document: doc,
            library: &library,
            builtins: BuiltinTable::standard(),
            config: &config,
            dependencies: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn test_text_only_page() {
        let mut b = DocumentBuilder::named("index.tpl");
        b.text("Hello, world!", 1);
        b.text("x", 2);
        let unit = generate_text(&b.finish().unwrap());
        assert!(unit.source.contains("package _tpl;"));
        assert!(unit.source.contains("public class index__tpl extends tagc.rt.TemplatePage {"));
        assert!(unit.source.contains("out.write(_tpl_string_0, 0, _tpl_string_0.length);"));
        assert!(unit.source.contains("out.write('x');"));
        assert!(unit
            .source
            .contains("private static final char[] _tpl_string_0 = \"Hello, world!\".toCharArray();"));
        assert!(unit.source.contains("_tpl_state.release();"));
        assert!(unit.instances.is_empty());
    }

    #[test]
    fn test_element_parts_split_attribute_bodies() {
        let mut b = DocumentBuilder::named("index.tpl");
        let el = b.open_element("x:box", "urn:x", &[("title", "T")], 1);
        b.open_attribute("footer", 2);
        b.text("F", 2);
        b.close(2).unwrap();
        b.text("body", 3);
        b.close(4).unwrap();
        let doc = b.finish().unwrap();

        let parts = ElementParts::of(&doc, el);
        assert_eq!(parts.attributes.len(), 2);
        assert!(matches!(parts.attribute("title"), Some(AttrValue::Static(v)) if v == "T"));
        assert!(matches!(parts.attribute("footer"), Some(AttrValue::Body(_))));
        assert_eq!(parts.body.len(), 1);
        assert!(parts.body_node.is_none());
    }

    #[test]
    fn test_explicit_body_block() {
        let mut b = DocumentBuilder::named("index.tpl");
        let el = b.open_element("x:box", "urn:x", &[], 1);
        b.open_body(2);
        b.text("a", 2);
        b.text("b", 3);
        b.close(3).unwrap();
        b.close(4).unwrap();
        let doc = b.finish().unwrap();

        let parts = ElementParts::of(&doc, el);
        assert_eq!(parts.body.len(), 2);
        assert!(parts.body_node.is_some());
    }
}
