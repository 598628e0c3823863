//! Inline code for the built-in control elements.
//!
//! These elements never allocate a handler: conditionals become `if` chains,
//! iteration becomes a loop, and output with constant arguments is escaped
//! at compile time and written as template text.

use tagc_el::Value;
use tagc_types::{BuiltinSpec, ControlKind, ErrorCode, NodeId, Primitive, TargetType};

use crate::body::{emit_body, emit_prologue, emit_text};
use crate::compiler::{AttrValue, ElementParts, GenContext, Resolved};
use crate::error::CodegenResult;
use crate::escape::{java_string, xml};
use crate::expr::{compile_value, constant_value, ValueRequest};
use crate::fragment;
use crate::runtime::*;
use crate::writer::JavaWriter;

const INT: TargetType = TargetType::Primitive(Primitive::Int);
const BOOLEAN: TargetType = TargetType::Primitive(Primitive::Boolean);

/// Prologue: register attribute-body fragments and walk the inline body.
pub fn prologue(ctx: &mut GenContext<'_>, id: NodeId, out: &mut JavaWriter) -> CodegenResult<()> {
    let parts = ElementParts::of(ctx.doc, id);
    for (_, value, _) in &parts.attributes {
        if let AttrValue::Body(body) = value {
            fragment::declare(ctx, *body, out)?;
        }
    }
    emit_prologue(ctx, &parts.body, out)
}

pub fn generate(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    spec: &BuiltinSpec,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let parts = ElementParts::of(ctx.doc, id);
    check_shape(ctx, id, spec, &parts)?;

    match spec.kind {
        ControlKind::If => generate_if(ctx, id, spec, &parts, out),
        ControlKind::Choose => generate_choose(ctx, id, &parts, out),
        ControlKind::ForEach => generate_for_each(ctx, id, spec, &parts, out),
        ControlKind::Out => generate_out(ctx, id, spec, &parts, out),
        ControlKind::Set => generate_set(ctx, id, spec, &parts, out),
        ControlKind::Remove => generate_remove(ctx, id, &parts, out),
        ControlKind::Catch => generate_catch(ctx, id, &parts, out),
        ControlKind::When | ControlKind::Otherwise => Err(ctx.error(
            id,
            ErrorCode::MISPLACED_ELEMENT,
            format!("{} must be a child of choose", ctx.doc.kind(id).label()),
        )),
    }
}

fn check_shape(
    ctx: &GenContext<'_>,
    id: NodeId,
    spec: &BuiltinSpec,
    parts: &ElementParts,
) -> CodegenResult<()> {
    for (name, _, _) in &parts.attributes {
        if spec.attribute(name).is_none() {
            return Err(ctx.error(
                id,
                ErrorCode::UNKNOWN_ATTRIBUTE,
                format!("{} has no attribute '{name}'", ctx.doc.kind(id).label()),
            ));
        }
    }
    for attr in spec.attributes.iter().filter(|a| a.required) {
        if parts.attribute(attr.name).is_none() {
            return Err(ctx.error(
                id,
                ErrorCode::MISSING_REQUIRED_ATTRIBUTE,
                format!("{} requires attribute '{}'", ctx.doc.kind(id).label(), attr.name),
            ));
        }
    }
    if !spec.body && parts.body.iter().any(|&c| !ctx.doc.kind(c).is_whitespace_text()) {
        return Err(ctx.error(
            id,
            ErrorCode::CONTENT_NOT_ALLOWED,
            format!("{} must be empty", ctx.doc.kind(id).label()),
        ));
    }
    Ok(())
}

// ── Attribute helpers ────────────────────────────────────────────────────────

fn value(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    spec: &BuiltinSpec,
    parts: &ElementParts,
    name: &str,
    target: &TargetType,
) -> CodegenResult<Option<String>> {
    let Some(value) = parts.attribute(name) else {
        return Ok(None);
    };
    let parent = ctx.parent_expr(id);
    let rtexpr = spec.attribute(name).map_or(true, |a| a.rtexpr);
    compile_value(
        ctx,
        &ValueRequest {
            node: id,
            attribute: name,
            value,
            target,
            rtexpr,
            deferred_value: None,
            deferred_method: None,
            parent: &parent,
        },
    )
    .map(Some)
}

/// An attribute that must be literal text, such as a variable name.
fn literal(ctx: &GenContext<'_>, id: NodeId, parts: &ElementParts, name: &str) -> CodegenResult<Option<String>> {
    match parts.attribute(name) {
        None => Ok(None),
        Some(AttrValue::Body(_)) => Err(ctx.error(
            id,
            ErrorCode::INVALID_ATTRIBUTE_VALUE,
            format!("attribute '{name}' must be literal text"),
        )),
        Some(AttrValue::Static(text)) => {
            if !ctx.config.el_ignored && (text.contains("${") || text.contains("#{")) {
                return Err(ctx.error(
                    id,
                    ErrorCode::IMMEDIATE_SYNTAX_NOT_ALLOWED,
                    format!("attribute '{name}' does not accept expressions"),
                ));
            }
            Ok(Some(text.clone()))
        }
    }
}

/// The `scope` attribute as a page-context constant.
fn scope(ctx: &GenContext<'_>, id: NodeId, parts: &ElementParts) -> CodegenResult<Option<String>> {
    let Some(name) = literal(ctx, id, parts, "scope")? else {
        return Ok(None);
    };
    scope_constant(&name).map(Some).ok_or_else(|| {
        ctx.error(
            id,
            ErrorCode::INVALID_ATTRIBUTE_VALUE,
            format!("'{name}' is not a scope; use page, request, session or application"),
        )
    })
}

fn page_scope() -> String {
    format!("{PAGE_CONTEXT}.PAGE_SCOPE")
}

// ══════════════════════════════════════════════════════════════════════════════
// Conditionals
// ══════════════════════════════════════════════════════════════════════════════

fn generate_if(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    spec: &BuiltinSpec,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let test = value(ctx, id, spec, parts, "test", &BOOLEAN)?.unwrap_or_else(|| "false".into());
    let var = literal(ctx, id, parts, "var")?;
    let scope = scope(ctx, id, parts)?.unwrap_or_else(page_scope);

    let test = match var {
        Some(var) => {
            let local = format!("_tpl_test_{}", ctx.unique_id());
            out.println(&format!("boolean {local} = {test};"));
            out.println(&format!(
                "pageContext.setAttribute({}, java.lang.Boolean.valueOf({local}), {scope});",
                java_string(&var)
            ));
            local
        }
        None => test,
    };

    if parts.body.is_empty() {
        return Ok(());
    }
    out.open(&format!("if ({test})"));
    emit_body(ctx, &parts.body, out)?;
    out.close("");
    Ok(())
}

fn generate_choose(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let doc = ctx.doc;
    let mut branches: Vec<(NodeId, &BuiltinSpec)> = Vec::new();
    let mut seen_otherwise = false;
    for &child in &parts.body {
        match ctx.resolve(child) {
            Resolved::Builtin(spec) if matches!(spec.kind, ControlKind::When | ControlKind::Otherwise) => {
                if seen_otherwise {
                    return Err(ctx.error(
                        child,
                        ErrorCode::MISPLACED_ELEMENT,
                        "otherwise must be the last branch of choose",
                    ));
                }
                seen_otherwise = spec.kind == ControlKind::Otherwise;
                branches.push((child, spec));
            }
            _ if doc.kind(child).is_whitespace_text() => {}
            _ => {
                return Err(ctx.error(
                    child,
                    ErrorCode::CONTENT_NOT_ALLOWED,
                    format!("{} is not allowed inside choose", doc.kind(child).label()),
                ))
            }
        }
    }
    if branches.is_empty() {
        return Err(ctx.error(id, ErrorCode::BODY_REQUIRED, "choose needs at least one when"));
    }

    for (i, (branch, spec)) in branches.into_iter().enumerate() {
        ctx.set_location(branch, out);
        let branch_parts = ElementParts::of(doc, branch);
        check_shape(ctx, branch, spec, &branch_parts)?;
        let header = match spec.kind {
            ControlKind::When => {
                let test = value(ctx, branch, spec, &branch_parts, "test", &BOOLEAN)?
                    .unwrap_or_else(|| "false".into());
                format!("if ({test})")
            }
            _ => String::new(),
        };
        if i == 0 {
            out.open(&header);
        } else {
            out.pop_depth();
            if header.is_empty() {
                out.println("} else {");
            } else {
                out.println(&format!("}} else {header} {{"));
            }
            out.push_depth();
        }
        emit_body(ctx, &branch_parts.body, out)?;
    }
    out.close("");
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Iteration
// ══════════════════════════════════════════════════════════════════════════════

fn generate_for_each(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    spec: &BuiltinSpec,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    if let Some(AttrValue::Static(step)) = parts.attribute("step") {
        if step.trim().parse::<i64>().is_ok_and(|s| s < 1) {
            return Err(ctx.error(
                id,
                ErrorCode::INVALID_ATTRIBUTE_VALUE,
                format!("forEach step must be at least 1, not {step}"),
            ));
        }
    }

    let n = ctx.unique_id();
    let var = literal(ctx, id, parts, "var")?;
    let status = literal(ctx, id, parts, "varStatus")?;
    let items = value(ctx, id, spec, parts, "items", &TargetType::Object)?;
    let begin = value(ctx, id, spec, parts, "begin", &INT)?;
    let end = value(ctx, id, spec, parts, "end", &INT)?;
    let step = value(ctx, id, spec, parts, "step", &INT)?.unwrap_or_else(|| "1".into());

    let (begin, end) = match (&items, begin, end) {
        (Some(_), begin, end) => (begin.unwrap_or_else(|| "0".into()), end.unwrap_or_else(|| "-1".into())),
        (None, Some(begin), Some(end)) => (begin, end),
        (None, _, _) => {
            return Err(ctx.error(
                id,
                ErrorCode::MISSING_REQUIRED_ATTRIBUTE,
                "forEach without items requires both begin and end",
            ))
        }
    };

    let saved: Vec<(String, String)> = var
        .iter()
        .chain(status.iter())
        .enumerate()
        .map(|(i, name)| (name.clone(), format!("_tpl_old_{n}_{i}")))
        .collect();
    for (name, local) in &saved {
        out.println(&format!(
            "java.lang.Object {local} = pageContext.getAttribute({});",
            java_string(name)
        ));
    }

    out.println(&format!("int _tpl_begin_{n} = {begin};"));
    out.println(&format!("int _tpl_end_{n} = {end};"));
    out.println(&format!("int _tpl_step_{n} = {step};"));
    if status.is_some() {
        out.println(&format!(
            "{RT_LOOP_STATUS} _tpl_status_{n} = new {RT_LOOP_STATUS}(_tpl_begin_{n}, _tpl_end_{n}, _tpl_step_{n});"
        ));
    }

    match items {
        Some(items) => {
            out.println(&format!(
                "java.util.Iterator _tpl_iter_{n} = {RT_SCOPES}.iterator({items}, _tpl_begin_{n}, _tpl_end_{n}, _tpl_step_{n});"
            ));
            out.open(&format!("while (_tpl_iter_{n}.hasNext())"));
            out.println(&format!("java.lang.Object _tpl_item_{n} = _tpl_iter_{n}.next();"));
        }
        None => {
            out.open(&format!(
                "for (int _tpl_i_{n} = _tpl_begin_{n}; _tpl_i_{n} <= _tpl_end_{n}; _tpl_i_{n} += _tpl_step_{n})"
            ));
            out.println(&format!(
                "java.lang.Integer _tpl_item_{n} = java.lang.Integer.valueOf(_tpl_i_{n});"
            ));
        }
    }
    if let Some(var) = &var {
        out.println(&format!("pageContext.setAttribute({}, _tpl_item_{n});", java_string(var)));
    }
    if let Some(status) = &status {
        out.println(&format!("_tpl_status_{n}.next(_tpl_item_{n});"));
        out.println(&format!(
            "pageContext.setAttribute({}, _tpl_status_{n});",
            java_string(status)
        ));
    }
    emit_body(ctx, &parts.body, out)?;
    out.close("");

    for (name, local) in &saved {
        out.println(&format!(
            "{RT_SCOPES}.restore(pageContext, {}, {local});",
            java_string(name)
        ));
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Output and variables
// ══════════════════════════════════════════════════════════════════════════════

fn generate_out(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    spec: &BuiltinSpec,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let escape_constant = match parts.attribute("escapeXml") {
        None => Some(true),
        Some(AttrValue::Static(text)) => constant_value(ctx, text).and_then(|v| v.to_bool().ok()),
        Some(AttrValue::Body(_)) => None,
    };
    let value_constant = match parts.attribute("value") {
        Some(AttrValue::Static(text)) => constant_value(ctx, text),
        _ => None,
    };

    if let (Some(escape), Some(v)) = (escape_constant, &value_constant) {
        if !v.is_null() {
            let text = v.to_text();
            let text = if escape { xml(&text) } else { text };
            emit_text(ctx, &text, out);
            return Ok(());
        }
    }

    let escape = match escape_constant {
        Some(escape) => escape.to_string(),
        None => value(ctx, id, spec, parts, "escapeXml", &BOOLEAN)?.unwrap_or_else(|| "true".into()),
    };

    if matches!(value_constant, Some(Value::Null)) {
        // Null value: only the default is written.
        if let Some(default) = value(ctx, id, spec, parts, "default", &TargetType::Object)? {
            out.println(&format!("{RT_OUT}.print(out, {default}, {escape});"));
        } else {
            emit_body(ctx, &parts.body, out)?;
        }
        return Ok(());
    }

    let printed =
        value(ctx, id, spec, parts, "value", &TargetType::Object)?.unwrap_or_else(|| "null".into());
    if let Some(default) = value(ctx, id, spec, parts, "default", &TargetType::Object)? {
        out.println(&format!("{RT_OUT}.print(out, {printed}, {default}, {escape});"));
    } else if parts.body.is_empty() {
        out.println(&format!("{RT_OUT}.print(out, {printed}, {escape});"));
    } else {
        out.open(&format!("if (! {RT_OUT}.print(out, {printed}, {escape}))"));
        emit_body(ctx, &parts.body, out)?;
        out.close("");
    }
    Ok(())
}

fn generate_set(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    spec: &BuiltinSpec,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let var = literal(ctx, id, parts, "var")?.unwrap_or_default();
    let scope = scope(ctx, id, parts)?.unwrap_or_else(page_scope);
    let var = java_string(&var);

    let value = match value(ctx, id, spec, parts, "value", &TargetType::Object)? {
        Some(value) => value,
        None if parts.body.is_empty() => "\"\"".to_string(),
        None => {
            let local = format!("_tpl_value_{}", ctx.unique_id());
            out.println("out = pageContext.pushBody();");
            emit_body(ctx, &parts.body, out)?;
            out.println(&format!(
                "java.lang.String {local} = (({BODY_CONTENT}) out).getString().trim();"
            ));
            out.println("out = pageContext.popBody();");
            local
        }
    };
    out.println(&format!("{RT_SCOPES}.set(pageContext, {var}, {value}, {scope});"));
    Ok(())
}

fn generate_remove(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let var = java_string(&literal(ctx, id, parts, "var")?.unwrap_or_default());
    match scope(ctx, id, parts)? {
        Some(scope) => out.println(&format!("pageContext.removeAttribute({var}, {scope});")),
        None => out.println(&format!("pageContext.removeAttribute({var});")),
    }
    Ok(())
}

fn generate_catch(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    parts: &ElementParts,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    let var = literal(ctx, id, parts, "var")?.map(|v| java_string(&v));
    let n = ctx.unique_id();

    out.open("try");
    emit_body(ctx, &parts.body, out)?;
    if let Some(var) = &var {
        out.println(&format!("pageContext.removeAttribute({var}, {});", page_scope()));
    }
    out.pop_depth();
    out.println(&format!("}} catch (java.lang.Throwable _tpl_exn_{n}) {{"));
    out.push_depth();
    out.println(&format!("if (_tpl_exn_{n} instanceof {SKIP_PAGE_EXCEPTION})"));
    out.println(&format!("  throw ({SKIP_PAGE_EXCEPTION}) _tpl_exn_{n};"));
    if let Some(var) = &var {
        out.println(&format!(
            "pageContext.setAttribute({var}, _tpl_exn_{n}, {});",
            page_scope()
        ));
    }
    out.close("");
    Ok(())
}
