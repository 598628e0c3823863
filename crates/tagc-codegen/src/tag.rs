//! Handler invocation: the classic and simple lifecycles.
//!
//! The prologue half registers the element with the tag registry and declares
//! whatever the method needs up front: the instance local, pre-declared
//! variables and fragment locals. The body half drives the handler through
//! its declared lifecycle, emitting only the branches its outcome flags allow.

use std::collections::BTreeMap;

use tagc_types::{ErrorCode, HandlerKind, HandlerType, NodeId, NodeKind, TargetType, VariableScope};

use crate::body::{emit_body, emit_prologue};
use crate::compiler::{internal, AttrValue, ElementParts, GenContext};
use crate::error::CodegenResult;
use crate::escape::{is_variable_name, java_string};
use crate::expr::{compile_value, ValueRequest};
use crate::fragment::{self, compile_fragment, FragmentMode, FragmentValue};
use crate::registry::InstanceRequest;
use crate::runtime::*;
use crate::writer::JavaWriter;

/// A variable one element occurrence exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub class: TargetType,
    pub scope: VariableScope,
    pub declare: bool,
}

/// Resolve the variables `handler` exposes at element `node`.
///
/// Attribute-named variables take the attribute's literal value; an absent
/// attribute exposes nothing.
pub fn bindings(
    ctx: &GenContext<'_>,
    node: NodeId,
    handler: &HandlerType,
) -> CodegenResult<Vec<Binding>> {
    let doc = ctx.doc;
    let mut found = Vec::new();
    for var in &handler.variables {
        let name = match (&var.name_given, &var.name_from_attribute) {
            (Some(name), _) => name.clone(),
            (None, Some(attr)) => match doc.node(node).attribute(attr) {
                Some(a) => a.value.clone(),
                None => {
                    let as_body = doc
                        .children(node)
                        .iter()
                        .any(|&c| matches!(doc.kind(c), NodeKind::AttributeBody(n) if n == attr));
                    if as_body {
                        return Err(ctx.error(
                            node,
                            ErrorCode::INVALID_VARIABLE_NAME,
                            format!("attribute '{attr}' names a variable and must be a literal"),
                        ));
                    }
                    continue;
                }
            },
            (None, None) => continue,
        };
        if !is_variable_name(&name) {
            return Err(ctx.error(
                node,
                ErrorCode::INVALID_VARIABLE_NAME,
                format!("'{name}' is not a valid variable name"),
            ));
        }
        found.push(Binding {
            name,
            class: var.class.clone(),
            scope: var.scope,
            declare: var.declare,
        });
    }
    Ok(found)
}

// ══════════════════════════════════════════════════════════════════════════════
// Prologue
// ══════════════════════════════════════════════════════════════════════════════

pub fn prologue(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    handler: &HandlerType,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let doc = ctx.doc;
    let NodeKind::Element(name) = doc.kind(id) else {
        return Err(internal("tag prologue on a non-element node"));
    };
    let qname = name.qname();
    let parts = ElementParts::of(doc, id);

    let attributes: BTreeMap<String, String> = parts
        .attributes
        .iter()
        .map(|(n, v, _)| {
            let value = match v {
                AttrValue::Static(text) => text.clone(),
                AttrValue::Body(_) => "#body".to_string(),
            };
            (n.clone(), value)
        })
        .collect();

    let request = InstanceRequest {
        node: id,
        scope: ctx.method.registry_scope,
        parent: ctx.parent_instance(id),
        qname: &qname,
        class_name: &handler.class_name,
        kind: handler.kind,
        instance_scope: handler.scope,
        attributes,
        has_body_content: handler.lifecycle.start_returns_buffered && !parts.body.is_empty(),
        reuse_allowed: ctx.config.recycle_tags && !handler.is_simple(),
    };
    let (instance, is_new) = ctx.registry.find_or_create(doc, request);
    let inst = ctx.registry.get(instance);
    if is_new && !inst.is_template_scoped() {
        out.println(&format!("{} {} = null;", inst.class_name, inst.id));
    }

    for binding in bindings(ctx, id, handler)? {
        if binding.scope == VariableScope::Nested
            || !binding.declare
            || ctx.method.declared.contains_key(&binding.name)
        {
            continue;
        }
        out.println(&format!(
            "{} {} = {};",
            binding.class.class_name(),
            binding.name,
            binding.class.zero_value()
        ));
        ctx.method.declared.insert(binding.name, binding.class);
    }

    for (_, value, _) in &parts.attributes {
        if let AttrValue::Body(body) = value {
            fragment::declare(ctx, *body, out)?;
        }
    }

    if handler.is_simple() {
        if !parts.body.is_empty() {
            fragment::declare(ctx, parts.body_node.unwrap_or(id), out)?;
        }
        Ok(())
    } else {
        emit_prologue(ctx, &parts.body, out)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Invocation
// ══════════════════════════════════════════════════════════════════════════════

pub fn generate(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    handler: &HandlerType,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let Some(instance) = ctx.registry.binding(id) else {
        return Err(internal(format!("element {} was not registered", id.0)));
    };
    let name = ctx.registry.get(instance).id.clone();
    let parts = ElementParts::of(ctx.doc, id);
    let bindings = bindings(ctx, id, handler)?;

    match handler.kind {
        HandlerKind::Classic => generate_classic(ctx, id, handler, &name, &parts, &bindings, out),
        HandlerKind::Simple => generate_simple(ctx, id, handler, &name, &parts, &bindings, out),
    }
}

fn generate_classic(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    handler: &HandlerType,
    name: &str,
    parts: &ElementParts,
    bindings: &[Binding],
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let lc = &handler.lifecycle;
    let doc = ctx.doc;
    let n = ctx.unique_id();

    // ── Retrieval ────────────────────────────────────────────────────────
    if !ctx.registry.is_declared(doc, id) {
        let parent = ctx.parent_expr(id);
        let template_scoped = ctx
            .registry
            .binding(id)
            .is_some_and(|inst| ctx.registry.get(inst).is_template_scoped());
        if template_scoped {
            out.println(&format!("{name}.setPageContext(pageContext);"));
            out.println(&format!("{name}.setParent({RT_PAGE}.toTag({parent}));"));
        } else {
            out.println(&format!("{name} = {STATE}.get{name}(pageContext, {parent});"));
        }
    }

    emit_setters(ctx, id, handler, name, parts, out)?;

    let guarded = lc.do_catch || lc.do_finally;
    let writer = format!("_tpl_writer_{n}");
    if lc.do_catch {
        out.println(&format!("{JSP_WRITER} {writer} = out;"));
    }
    if guarded {
        out.open("try");
    }

    // ── Start ────────────────────────────────────────────────────────────
    let start_count = lc.start_outcomes();
    let eval = format!("_tpl_eval_{n}");
    if lc.do_start {
        if start_count > 1 {
            out.println(&format!("int {eval} = {name}.doStartTag();"));
        } else {
            out.println(&format!("{name}.doStartTag();"));
        }
    }
    assign_bindings(bindings, VariableScope::AtBegin, out);

    // ── Body ─────────────────────────────────────────────────────────────
    let body_never_runs = lc.do_start && start_count == 1 && lc.start_returns_skip;
    if !parts.body.is_empty() && !body_never_runs {
        let nested: Vec<&Binding> = bindings
            .iter()
            .filter(|b| b.scope == VariableScope::Nested)
            .collect();
        let loops = lc.do_after_body && lc.after_returns_again;
        let guard = lc.do_start && start_count > 1 && lc.start_returns_skip;
        let has_scripting = parts.body.iter().any(|&c| doc.kind(c).is_scripting());
        let block = !guard && !guarded && !loops && (!nested.is_empty() || has_scripting);
        let buffered = lc.start_returns_buffered;
        let both = buffered && lc.start_returns_include && start_count > 1;

        if guard {
            out.open(&format!("if ({eval} != {})", skip_body()));
        } else if block {
            out.open("");
        }

        if buffered {
            if both {
                out.open(&format!("if ({eval} == {})", eval_body_buffered()));
            }
            out.println("out = pageContext.pushBody();");
            out.println(&format!("{name}.setBodyContent(({BODY_CONTENT}) out);"));
            if lc.do_init_body {
                out.println(&format!("{name}.doInitBody();"));
            }
            if both {
                out.close("");
            }
        }

        if loops {
            out.open("do");
        }
        for binding in &nested {
            let read = read_attribute(&binding.class, &java_string(&binding.name));
            if binding.declare && !ctx.method.declared.contains_key(&binding.name) {
                out.println(&format!("{} {} = {read};", binding.class.class_name(), binding.name));
            } else {
                out.println(&format!("{} = {read};", binding.name));
            }
        }
        emit_body(ctx, &parts.body, out)?;
        if loops {
            out.close(&format!(" while ({name}.doAfterBody() == {});", eval_body_again()));
        } else if lc.do_after_body {
            out.println(&format!("{name}.doAfterBody();"));
        }

        if buffered {
            if both {
                out.println(&format!("if ({eval} == {})", eval_body_buffered()));
                out.println("  out = pageContext.popBody();");
            } else {
                out.println("out = pageContext.popBody();");
            }
        }

        if guard || block {
            out.close("");
        }
    }

    // ── End ──────────────────────────────────────────────────────────────
    ctx.set_end_location(id, out);
    let end = format!("_tpl_end_{n}");
    let end_count = lc.end_outcomes();
    if lc.do_end {
        if end_count > 1 {
            out.println(&format!("int {end} = {name}.doEndTag();"));
        } else {
            out.println(&format!("{name}.doEndTag();"));
        }
    }
    if lc.do_end && lc.end_returns_skip_page {
        if end_count > 1 {
            out.println(&format!("if ({end} == {})", skip_page()));
        } else {
            out.println("if (true)");
        }
        out.println(&format!("  {}", ctx.skip_page_statement()));
    }

    if lc.do_catch {
        out.pop_depth();
        out.println(&format!("}} catch (java.lang.Throwable _tpl_exn_{n}) {{"));
        out.push_depth();
        out.println(&format!("out = {RT_PAGE}.restoreOut(pageContext, {writer});"));
        out.println(&format!("{name}.doCatch(_tpl_exn_{n});"));
    }
    if lc.do_finally {
        out.pop_depth();
        out.println("} finally {");
        out.push_depth();
        out.println(&format!("{name}.doFinally();"));
    }
    if guarded {
        out.close("");
    }

    assign_bindings(bindings, VariableScope::AtEnd, out);
    Ok(())
}

fn generate_simple(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    handler: &HandlerType,
    name: &str,
    parts: &ElementParts,
    bindings: &[Binding],
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let parent = ctx.parent_expr(id);
    out.println(&format!("{name} = new {}();", handler.class_name));
    out.println(&format!("{name}.setJspContext(pageContext);"));
    out.println(&format!("{name}.setParent({parent});"));

    emit_setters(ctx, id, handler, name, parts, out)?;

    if !parts.body.is_empty() {
        let source = parts.body_node.unwrap_or(id);
        match compile_fragment(ctx, source, FragmentMode::Stream, name)? {
            FragmentValue::Expr(frag) => out.println(&format!("{name}.setJspBody({frag});")),
            FragmentValue::Text(_) => return Err(internal("stream fragment compiled to text")),
        }
    }

    ctx.set_end_location(id, out);
    out.println(&format!("{name}.doTag();"));
    assign_bindings(bindings, VariableScope::AtBegin, out);
    assign_bindings(bindings, VariableScope::AtEnd, out);
    Ok(())
}

/// One setter call per attribute on this occurrence.
fn emit_setters(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    handler: &HandlerType,
    name: &str,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let lib = ctx.lib;
    let file = ctx.doc.file_name(id);
    for (attr, value, span) in &parts.attributes {
        let Some(setter) = lib.setter(handler, attr) else {
            return Err(match handler.attribute(attr) {
                Some(_) => ctx.error(
                    id,
                    ErrorCode::NO_SETTER,
                    format!("{} has no setter for attribute '{attr}'", handler.class_name),
                ),
                None => ctx.error(
                    id,
                    ErrorCode::UNKNOWN_ATTRIBUTE,
                    format!("unknown attribute '{attr}'"),
                ),
            });
        };
        out.set_location(file, span.start_line);
        let expr = compile_value(
            ctx,
            &ValueRequest {
                node: id,
                attribute: attr,
                value,
                target: &setter.target,
                rtexpr: setter.rtexpr,
                deferred_value: setter.deferred_value.as_deref(),
                deferred_method: setter.deferred_method.as_deref(),
                parent: name,
            },
        )?;
        if setter.is_dynamic() {
            out.println(&format!(
                "{name}.setDynamicAttribute(null, {}, {expr});",
                java_string(attr)
            ));
        } else {
            out.println(&format!("{name}.{}({expr});", setter.method));
        }
    }
    Ok(())
}

/// Synchronize variables of `scope` from the page context.
fn assign_bindings(bindings: &[Binding], scope: VariableScope, out: &mut JavaWriter) {
    for binding in bindings.iter().filter(|b| b.scope == scope) {
        out.println(&format!(
            "{} = {};",
            binding.name,
            read_attribute(&binding.class, &java_string(&binding.name))
        ));
    }
}
