//! Prologue and body passes over a node list.
//!
//! The prologue walks the method's subtree once in preorder, stopping at
//! fragment boundaries, so every declaration lands before the first
//! statement. The body pass then emits statements in document order.

use tagc_el::parse;
use tagc_types::{ErrorCode, NodeId, NodeKind};

use crate::builtin;
use crate::compiler::{GenContext, Resolved};
use crate::error::CodegenResult;
use crate::escape::java_char;
use crate::expr::constant_value;
use crate::runtime::ENV;
use crate::tables::SlotKind;
use crate::tag;
use crate::writer::JavaWriter;

// ══════════════════════════════════════════════════════════════════════════════
// Prologue
// ══════════════════════════════════════════════════════════════════════════════

pub fn emit_prologue(ctx: &mut GenContext<'_>, nodes: &[NodeId], out: &mut JavaWriter) -> CodegenResult<()> {
    for &id in nodes {
        match ctx.resolve(id) {
            Resolved::Handler(handler) => {
                ctx.set_location(id, out);
                tag::prologue(ctx, id, handler, out)?;
            }
            Resolved::Builtin(_) => builtin::prologue(ctx, id, out)?,
            Resolved::Unknown => return Err(unknown_element(ctx, id)),
            Resolved::NotElement => {}
        }
    }
    Ok(())
}

fn unknown_element(ctx: &GenContext<'_>, id: NodeId) -> crate::error::CodegenError {
    ctx.error(
        id,
        ErrorCode::UNKNOWN_ELEMENT,
        format!("no handler is registered for {}", ctx.doc.kind(id).label()),
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// Body
// ══════════════════════════════════════════════════════════════════════════════

pub fn emit_body(ctx: &mut GenContext<'_>, nodes: &[NodeId], out: &mut JavaWriter) -> CodegenResult<()> {
    for &id in nodes {
        emit_node(ctx, id, out)?;
    }
    Ok(())
}

fn emit_node(ctx: &mut GenContext<'_>, id: NodeId, out: &mut JavaWriter) -> CodegenResult<()> {
    let doc = ctx.doc;
    ctx.set_location(id, out);
    match doc.kind(id) {
        NodeKind::Text(text) => {
            if !(ctx.config.trim_whitespace && text.trim().is_empty()) {
                emit_text(ctx, text, out);
            }
        }
        NodeKind::Expression(source) => emit_expression(ctx, id, source, out)?,
        NodeKind::Scriptlet(code) => {
            check_scripting(ctx, id)?;
            out.println(code.trim());
        }
        NodeKind::ScriptExpression(code) => {
            check_scripting(ctx, id)?;
            out.println(&format!("out.print({});", code.trim()));
        }
        NodeKind::Declaration(_) => check_scripting(ctx, id)?,
        NodeKind::Directive(_) => {}
        NodeKind::Element(_) => match ctx.resolve(id) {
            Resolved::Handler(handler) => tag::generate(ctx, id, handler, out)?,
            Resolved::Builtin(spec) => builtin::generate(ctx, id, spec, out)?,
            _ => return Err(unknown_element(ctx, id)),
        },
        NodeKind::Root => {
            let children = doc.children(id).to_vec();
            emit_body(ctx, &children, out)?;
        }
        NodeKind::AttributeBody(_) | NodeKind::Body => {
            return Err(ctx.error(
                id,
                ErrorCode::MISPLACED_ELEMENT,
                format!("{} must be a direct child of an element", doc.kind(id).label()),
            ));
        }
    }
    Ok(())
}

fn check_scripting(ctx: &GenContext<'_>, id: NodeId) -> CodegenResult<()> {
    if ctx.config.scripting_invalid {
        return Err(ctx.error(
            id,
            ErrorCode::SCRIPTING_NOT_ALLOWED,
            format!("{} is not allowed when scripting is disabled", ctx.doc.kind(id).label()),
        ));
    }
    Ok(())
}

/// Write template text through the shared constant table.
pub fn emit_text(ctx: &mut GenContext<'_>, text: &str, out: &mut JavaWriter) {
    if text.is_empty() {
        return;
    }
    let mut chars = text.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(literal) = java_char(c) {
            out.println(&format!("out.write({literal});"));
            return;
        }
    }
    let name = ctx.tables.string(text);
    out.println(&format!("out.write({name}, 0, {name}.length);"));
}

/// `${...}` in template text: folded to text when constant.
fn emit_expression(
    ctx: &mut GenContext<'_>,
    id: NodeId,
    source: &str,
    out: &mut JavaWriter,
) -> CodegenResult<()> {
    if ctx.config.el_ignored {
        emit_text(ctx, source, out);
        return Ok(());
    }
    let template = parse(source).map_err(|e| {
        ctx.error(
            id,
            ErrorCode::MALFORMED_EXPRESSION,
            format!("malformed expression \"{source}\": {e}"),
        )
    })?;
    if template.has_deferred() {
        if !ctx.config.deferred_syntax_allowed_as_literal {
            return Err(ctx.error(
                id,
                ErrorCode::DEFERRED_SYNTAX_NOT_ALLOWED,
                "#{} is not allowed in template text",
            ));
        }
        if !template.has_immediate() {
            emit_text(ctx, source, out);
            return Ok(());
        }
    }

    if let Some(value) = constant_value(ctx, source) {
        emit_text(ctx, &value.to_text(), out);
        return Ok(());
    }
    let slot = ctx.tables.slot(SlotKind::Expr, source);
    out.println(&format!("{slot}.print(out, {ENV}, false);"));
    Ok(())
}
