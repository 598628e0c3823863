//! Fragment compiler.
//!
//! A fragment is a deferred block of template content: an attribute body or
//! the body of a simple handler. Text-only fragments become static objects.
//! Every other fragment becomes a numbered routine of the shared
//! `_TplFragment` class, and each use site yields a recycled fragment object
//! (stream mode) or its rendered string (value mode).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tagc_types::{Document, ErrorCode, NodeId, NodeKind, TargetType, VariableScope};

use crate::body::{emit_body, emit_prologue};
use crate::compiler::{ElementParts, GenContext, MethodScope, Resolved};
use crate::error::CodegenResult;
use crate::escape::java_string;
use crate::registry::RegistryScope;
use crate::runtime::*;
use crate::tag::bindings;
use crate::writer::JavaWriter;

/// How a use site consumes the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentMode {
    /// The handler receives the fragment object and invokes it itself.
    Stream,
    /// The fragment is rendered to a string at the use site.
    Value,
}

/// Compiled form of a fragment use site.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentValue {
    /// Static text, left to the caller to convert.
    Text(String),
    /// An expression yielding a fragment object or a string.
    Expr(String),
}

#[derive(Debug, Clone)]
pub struct FragmentInfo {
    pub index: u32,
    /// The attribute body, body block or simple-handler element.
    pub node: NodeId,
    pub is_static: bool,
    /// Concatenated text of a static fragment.
    pub text: String,
    /// Bindings the routine replays from the page context before it runs.
    pub inherited: BTreeMap<String, TargetType>,
}

impl FragmentInfo {
    pub fn routine(&self) -> String {
        format!("_tpl_fragment_{}", self.index)
    }

    /// Local that recycles the fragment object within one method.
    pub fn variable(&self) -> String {
        format!("_tpl_frag_{}", self.index)
    }
}

/// Unit-wide fragment table, deduplicated by node.
#[derive(Debug, Default)]
pub struct FragmentTable {
    entries: Vec<FragmentInfo>,
    by_node: HashMap<NodeId, u32>,
}

impl FragmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, node: NodeId) -> Option<u32> {
        self.by_node.get(&node).copied()
    }

    pub fn get(&self, index: u32) -> &FragmentInfo {
        &self.entries[index as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dynamic_count(&self) -> usize {
        self.entries.iter().filter(|f| !f.is_static).count()
    }

    fn insert(&mut self, doc: &Document, node: NodeId, inherited: BTreeMap<String, TargetType>) -> u32 {
        let children = fragment_children(doc, node);
        let is_static = children
            .iter()
            .all(|&c| matches!(doc.kind(c), NodeKind::Text(_)));
        let text = if is_static {
            children
                .iter()
                .filter_map(|&c| match doc.kind(c) {
                    NodeKind::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect()
        } else {
            String::new()
        };
        let index = self.entries.len() as u32;
        self.entries.push(FragmentInfo {
            index,
            node,
            is_static,
            text,
            inherited,
        });
        self.by_node.insert(node, index);
        index
    }
}

/// Content nodes of a fragment source.
pub fn fragment_children(doc: &Document, node: NodeId) -> Vec<NodeId> {
    match doc.kind(node) {
        NodeKind::Element(_) => ElementParts::of(doc, node).body,
        _ => doc.children(node).to_vec(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Registration
// ══════════════════════════════════════════════════════════════════════════════

/// Register the fragment rooted at `node`, once per unit.
pub fn register(ctx: &mut GenContext<'_>, node: NodeId) -> CodegenResult<u32> {
    if let Some(index) = ctx.fragments.lookup(node) {
        return Ok(index);
    }
    let doc = ctx.doc;
    if let Some(script) = doc.find_scripting(node) {
        return Err(ctx.error(
            script,
            ErrorCode::SCRIPTING_NOT_ALLOWED,
            format!("{} is not allowed inside a fragment", doc.kind(script).label()),
        ));
    }
    let inherited = inherited_bindings(ctx, node)?;
    let index = ctx.fragments.insert(doc, node, inherited);
    tracing::debug!(
        fragment = index,
        node = node.0,
        is_static = ctx.fragments.get(index).is_static,
        "registered fragment"
    );
    Ok(index)
}

/// Prologue step: register and declare the recycling local once per method.
pub fn declare(ctx: &mut GenContext<'_>, node: NodeId, out: &mut JavaWriter) -> CodegenResult<()> {
    let index = register(ctx, node)?;
    if ctx.fragments.get(index).is_static || ctx.method.fragment_vars.contains(&index) {
        return Ok(());
    }
    out.println(&format!(
        "{FRAGMENT_CLASS} {} = null;",
        ctx.fragments.get(index).variable()
    ));
    ctx.method.fragment_vars.insert(index);
    Ok(())
}

/// Method locals plus the variables enclosing handlers expose to their bodies.
fn inherited_bindings(
    ctx: &GenContext<'_>,
    node: NodeId,
) -> CodegenResult<BTreeMap<String, TargetType>> {
    let mut inherited = ctx.method.declared.clone();
    let doc = ctx.doc;
    for el in std::iter::once(node).chain(doc.ancestors(node)) {
        if Some(el) == ctx.method.root {
            break;
        }
        let Resolved::Handler(handler) = ctx.resolve(el) else {
            continue;
        };
        for binding in bindings(ctx, el, handler)? {
            if matches!(binding.scope, VariableScope::Nested | VariableScope::AtBegin) {
                inherited.entry(binding.name).or_insert(binding.class);
            }
        }
    }
    Ok(inherited)
}

// ══════════════════════════════════════════════════════════════════════════════
// Use sites
// ══════════════════════════════════════════════════════════════════════════════

/// Compile a use of the fragment rooted at `node` whose parent handler is `parent`.
pub fn compile_fragment(
    ctx: &mut GenContext<'_>,
    node: NodeId,
    mode: FragmentMode,
    parent: &str,
) -> CodegenResult<FragmentValue> {
    let index = register(ctx, node)?;
    let info = ctx.fragments.get(index);
    if info.is_static {
        return Ok(match mode {
            FragmentMode::Stream => FragmentValue::Expr(format!(
                "{RT_STATIC_FRAGMENT}.create(pageContext, {})",
                java_string(&info.text)
            )),
            FragmentMode::Value => FragmentValue::Text(info.text.clone()),
        });
    }

    let create = if ctx.method.fragment_vars.contains(&index) {
        let var = info.variable();
        format!("({var} = {FRAGMENT_CLASS}.create({var}, {index}, pageContext, {parent}, {STATE}))")
    } else {
        format!("{FRAGMENT_CLASS}.create(null, {index}, pageContext, {parent}, {STATE})")
    };
    Ok(FragmentValue::Expr(match mode {
        FragmentMode::Stream => create,
        FragmentMode::Value => format!("{create}.invokeString()"),
    }))
}

// ══════════════════════════════════════════════════════════════════════════════
// Epilogue
// ══════════════════════════════════════════════════════════════════════════════

/// The shared fragment class with one routine per dynamic fragment.
pub fn emit_fragment_class(ctx: &mut GenContext<'_>, out: &mut JavaWriter) -> CodegenResult<()> {
    if ctx.fragments.dynamic_count() == 0 {
        return Ok(());
    }

    out.blank();
    out.open(&format!("public final static class {FRAGMENT_CLASS} extends {JSP_FRAGMENT}"));
    out.println("private int _tpl_code;");
    out.println(&format!("private {PAGE_CONTEXT} pageContext;"));
    out.println(&format!("private {EL_CONTEXT} {ENV};"));
    out.println(&format!("private {JSP_TAG} {PARENT_TAG};"));
    out.println(&format!("private {STATE_CLASS} {STATE};"));

    out.blank();
    out.println(&format!("static {FRAGMENT_CLASS} create({FRAGMENT_CLASS} frag,"));
    out.println("                           int code,");
    out.println(&format!("                           {PAGE_CONTEXT} pageContext,"));
    out.println(&format!("                           {JSP_TAG} parent,"));
    out.println(&format!("                           {STATE_CLASS} state)"));
    out.open("");
    out.println("if (frag == null)");
    out.println(&format!("  frag = new {FRAGMENT_CLASS}();"));
    out.blank();
    out.println("frag._tpl_code = code;");
    out.println("frag.pageContext = pageContext;");
    out.println(&format!("frag.{ENV} = pageContext.getELContext();"));
    out.println(&format!("frag.{PARENT_TAG} = parent;"));
    out.println(&format!("frag.{STATE} = state;"));
    out.blank();
    out.println("return frag;");
    out.close("");

    out.blank();
    out.println(&format!("public {JSP_CONTEXT} getJspContext()"));
    out.open("");
    out.println("return pageContext;");
    out.close("");

    // Routines can register further fragments while they are generated.
    let mut index = 0;
    while (index as usize) < ctx.fragments.len() {
        if !ctx.fragments.get(index).is_static {
            emit_routine(ctx, index, out)?;
        }
        index += 1;
    }
    out.clear_location();

    out.blank();
    out.println("public void invoke(java.io.Writer writer)");
    out.println(&format!("  throws {JSP_EXCEPTION}, {IO_EXCEPTION}"));
    out.open("");
    out.println(&format!("{JSP_WRITER} out;"));
    out.println("if (writer == null)");
    out.println("  out = pageContext.getOut();");
    out.println("else");
    out.println("  out = pageContext.pushBody(writer);");
    out.blank();
    out.open("try");
    out.open("switch (_tpl_code)");
    for index in 0..ctx.fragments.len() as u32 {
        let info = ctx.fragments.get(index);
        if info.is_static {
            continue;
        }
        out.println(&format!("case {index}:"));
        out.println(&format!("  {}(out);", info.routine()));
        out.println("  break;");
    }
    out.close("");
    out.pop_depth();
    out.println(&format!("}} catch ({JSP_EXCEPTION} e) {{"));
    out.println("  throw e;");
    out.println(&format!("}} catch ({IO_EXCEPTION} e) {{"));
    out.println("  throw e;");
    out.println("} catch (java.lang.RuntimeException e) {");
    out.println("  throw e;");
    out.println("} catch (java.lang.Throwable e) {");
    out.println(&format!("  throw new {JSP_EXCEPTION}(e);"));
    out.println("} finally {");
    out.push_depth();
    out.println("if (writer != null)");
    out.println("  pageContext.popBody();");
    out.close("");
    out.close("");

    out.blank();
    out.println("public java.lang.String invokeString()");
    out.println(&format!("  throws {JSP_EXCEPTION}, {IO_EXCEPTION}"));
    out.open("");
    out.println("java.io.StringWriter writer = new java.io.StringWriter();");
    out.println("invoke(writer);");
    out.println("return writer.toString();");
    out.close("");

    out.close("");
    Ok(())
}

fn emit_routine(ctx: &mut GenContext<'_>, index: u32, out: &mut JavaWriter) -> CodegenResult<()> {
    let info = ctx.fragments.get(index).clone();
    let scope = MethodScope {
        registry_scope: RegistryScope::Fragment(index),
        root: Some(info.node),
        in_fragment: true,
        declared: info.inherited.clone(),
        fragment_vars: BTreeSet::new(),
    };
    let saved = std::mem::replace(&mut ctx.method, scope);

    out.blank();
    ctx.set_location(info.node, out);
    out.println(&format!("private void {}({JSP_WRITER} out)", info.routine()));
    out.println("  throws java.lang.Throwable");
    out.open("");
    for (name, class) in &info.inherited {
        out.println(&format!(
            "{} {name} = {};",
            class.class_name(),
            read_attribute(class, &java_string(name))
        ));
    }

    let children = fragment_children(ctx.doc, info.node);
    let result = emit_prologue(ctx, &children, out).and_then(|_| emit_body(ctx, &children, out));
    ctx.method = saved;
    result?;

    out.close("");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CodegenInput;
    use tagc_types::{
        AttributeInfo, BuiltinTable, DocumentBuilder, HandlerType, Lifecycle, PageConfig, TagLibrary,
    };

    #[test]
    fn test_two_call_sites_share_one_routine() {
        let library = TagLibrary::new()
            .with("x:box", HandlerType::simple("demo.BoxTag"))
            .with(
                "x:hello",
                HandlerType::classic("demo.HelloTag")
                    .with_attribute(AttributeInfo::new("name", TargetType::String))
                    .with_lifecycle(Lifecycle::empty_tag()),
            );
        let mut b = DocumentBuilder::named("index.tpl");
        let body = b.open_element("x:box", "urn:x", &[], 1);
        b.empty_element("x:hello", "urn:x", &[("name", "${user}")], 2);
        b.close(3).unwrap();
        let doc = b.finish().unwrap();
        let config = PageConfig::default();
        let input = CodegenInput {
            document: &doc,
            library: &library,
            builtins: BuiltinTable::standard(),
            config: &config,
            dependencies: Vec::new(),
        };
        let mut ctx = GenContext::new(&input);

        let first = compile_fragment(&mut ctx, body, FragmentMode::Stream, "_tpl_box_0").unwrap();
        let second = compile_fragment(&mut ctx, body, FragmentMode::Value, "_tpl_box_0").unwrap();
        assert_eq!(ctx.fragments.len(), 1);
        let (FragmentValue::Expr(first), FragmentValue::Expr(second)) = (first, second) else {
            panic!("dynamic fragment compiled to text");
        };
        assert_eq!(
            first,
            "_TplFragment.create(null, 0, pageContext, _tpl_box_0, _tpl_state)"
        );
        assert_eq!(
            second,
            "_TplFragment.create(null, 0, pageContext, _tpl_box_0, _tpl_state).invokeString()"
        );

        let mut out = JavaWriter::new();
        emit_fragment_class(&mut ctx, &mut out).unwrap();
        let (source, _) = out.finish();
        assert_eq!(source.matches("private void _tpl_fragment_0(").count(), 1);
        assert_eq!(source.matches("case 0:").count(), 1);
        assert_eq!(source.matches("case 1:").count(), 0);
        assert_eq!(source.matches("_tpl_hello_0.setName(").count(), 1);
    }

    #[test]
    fn test_static_classification() {
        let mut b = DocumentBuilder::named("index.tpl");
        b.open_element("x:box", "urn:x", &[], 1);
        let text_body = b.open_attribute("title", 1);
        b.text("Hello", 1);
        b.text(" there", 1);
        b.close(1).unwrap();
        let dynamic_body = b.open_attribute("footer", 2);
        b.text("Hi ", 2);
        b.expression("${name}", 2);
        b.close(2).unwrap();
        b.close(3).unwrap();
        let doc = b.finish().unwrap();

        let mut table = FragmentTable::new();
        let a = table.insert(&doc, text_body, BTreeMap::new());
        let b = table.insert(&doc, dynamic_body, BTreeMap::new());
        assert!(table.get(a).is_static);
        assert_eq!(table.get(a).text, "Hello there");
        assert!(!table.get(b).is_static);
        assert_eq!(table.dynamic_count(), 1);
        assert_eq!(table.lookup(dynamic_body), Some(1));
        assert_eq!(table.get(b).routine(), "_tpl_fragment_1");
        assert_eq!(table.get(b).variable(), "_tpl_frag_1");
    }

    #[test]
    fn test_empty_fragment_is_static() {
        let mut b = DocumentBuilder::named("index.tpl");
        b.open_element("x:box", "urn:x", &[], 1);
        let empty = b.open_attribute("title", 1);
        b.close(1).unwrap();
        b.close(1).unwrap();
        let doc = b.finish().unwrap();

        let mut table = FragmentTable::new();
        let idx = table.insert(&doc, empty, BTreeMap::new());
        assert!(table.get(idx).is_static);
        assert_eq!(table.get(idx).text, "");
    }
}
