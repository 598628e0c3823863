//! Pooled tag state and template-scoped handler statics.
//!
//! `TagState` holds one field per dispatch-scoped classic instance. Getters
//! create and attach the handler on first use; `release()` runs exactly once
//! per dispatch from the page wrapper's `finally` block.

use tagc_types::HandlerKind;

use crate::compiler::GenContext;
use crate::registry::TagInstance;
use crate::runtime::*;
use crate::writer::JavaWriter;

pub fn emit_tag_state(ctx: &GenContext<'_>, out: &mut JavaWriter) {
    let pooled: Vec<&TagInstance> = ctx
        .registry
        .instances()
        .iter()
        .filter(|inst| inst.is_pooled())
        .collect();

    out.blank();
    out.open(&format!("final static class {STATE_CLASS}"));
    for inst in &pooled {
        out.println(&format!("private {} {};", inst.class_name, inst.id));
    }

    for inst in &pooled {
        out.blank();
        out.println(&format!("final {} get{}({PAGE_CONTEXT} pageContext,", inst.class_name, inst.id));
        out.println(&format!("    {JSP_TAG} {PARENT_TAG})"));
        out.println("  throws java.lang.Throwable");
        out.open("");
        out.open(&format!("if ({} == null)", inst.id));
        out.println(&format!("{} = new {}();", inst.id, inst.class_name));
        out.println(&format!("{}.setPageContext(pageContext);", inst.id));
        emit_set_parent(ctx, inst, out);
        out.close("");
        out.blank();
        out.println(&format!("return {};", inst.id));
        out.close("");
    }

    out.blank();
    out.println("void release()");
    out.open("");
    for inst in &pooled {
        out.open(&format!("if ({} != null)", inst.id));
        out.println(&format!("{}.release();", inst.id));
        out.println(&format!("{} = null;", inst.id));
        out.close("");
    }
    out.close("");
    out.close("");
}

/// Attach a classic handler to whatever kind of parent encloses it.
fn emit_set_parent(ctx: &GenContext<'_>, inst: &TagInstance, out: &mut JavaWriter) {
    let id = &inst.id;
    match inst.parent.map(|p| ctx.registry.get(p).kind) {
        Some(HandlerKind::Classic) => {
            out.println(&format!("{id}.setParent(({TAG}) {PARENT_TAG});"));
        }
        Some(HandlerKind::Simple) => {
            out.println(&format!(
                "{id}.setParent(new {TAG_ADAPTER}(({SIMPLE_TAG}) {PARENT_TAG}));"
            ));
        }
        None => {
            out.println(&format!("if ({PARENT_TAG} instanceof {TAG})"));
            out.println(&format!("  {id}.setParent(({TAG}) {PARENT_TAG});"));
            out.println(&format!("else if ({PARENT_TAG} instanceof {SIMPLE_TAG})"));
            out.println(&format!(
                "  {id}.setParent(new {TAG_ADAPTER}(({SIMPLE_TAG}) {PARENT_TAG}));"
            ));
            out.println("else");
            out.println(&format!("  {id}.setParent(null);"));
        }
    }
}

/// Shared handlers of template scope and the `_tpl_destroy()` that releases them.
pub fn emit_template_statics(ctx: &GenContext<'_>, out: &mut JavaWriter) {
    let shared: Vec<&TagInstance> = ctx
        .registry
        .instances()
        .iter()
        .filter(|inst| inst.is_template_scoped())
        .collect();

    out.blank();
    for inst in &shared {
        out.println(&format!(
            "private static final {0} {1} = new {0}();",
            inst.class_name, inst.id
        ));
    }

    out.blank();
    out.println(&format!("public void {DESTROY}()"));
    out.open("");
    for inst in &shared {
        out.println(&format!("{}.release();", inst.id));
    }
    out.close("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CodegenInput;
    use crate::registry::{InstanceRequest, RegistryScope};
    use std::collections::BTreeMap;
    use tagc_types::{BuiltinTable, DocumentBuilder, InstanceScope, PageConfig, TagLibrary};

    #[test]
    fn test_state_getter_and_release() {
        let mut b = DocumentBuilder::named("index.tpl");
        let node = b.empty_element("x:hello", "urn:x", &[], 1);
        let doc = b.finish().unwrap();
        let library = TagLibrary::new();
        let config = PageConfig::default();
        let input = CodegenInput {
            document: &doc,
            library: &library,
            builtins: BuiltinTable::standard(),
            config: &config,
            dependencies: Vec::new(),
        };
        let mut ctx = GenContext::new(&input);
        ctx.registry.find_or_create(
            &doc,
            InstanceRequest {
                node,
                scope: RegistryScope::Page,
                parent: None,
                qname: "x:hello",
                class_name: "demo.HelloTag",
                kind: HandlerKind::Classic,
                instance_scope: InstanceScope::Dispatch,
                attributes: BTreeMap::new(),
                has_body_content: false,
                reuse_allowed: true,
            },
        );

        let mut w = JavaWriter::new();
        emit_tag_state(&ctx, &mut w);
        let (text, _) = w.finish();
        assert!(text.contains("private demo.HelloTag _tpl_hello_0;"));
        assert!(text.contains("final demo.HelloTag get_tpl_hello_0(javax.servlet.jsp.PageContext pageContext,"));
        assert_eq!(text.matches("new demo.HelloTag()").count(), 1);
        assert!(text.contains("if (_tpl_parent_tag instanceof javax.servlet.jsp.tagext.SimpleTag)"));
        assert!(text.contains("_tpl_hello_0.release();"));
    }
}
