//! Names of the host API and of the generated identifiers.
//!
//! Everything the generated source references by name is collected here so
//! the emitters never spell a host class twice.

use tagc_types::{Primitive, TargetType};

// ══════════════════════════════════════════════════════════════════════════════
// Host API
// ══════════════════════════════════════════════════════════════════════════════

pub const PAGE_CONTEXT: &str = "javax.servlet.jsp.PageContext";
pub const JSP_WRITER: &str = "javax.servlet.jsp.JspWriter";
pub const JSP_EXCEPTION: &str = "javax.servlet.jsp.JspException";
pub const SKIP_PAGE_EXCEPTION: &str = "javax.servlet.jsp.SkipPageException";
pub const REQUEST: &str = "javax.servlet.http.HttpServletRequest";
pub const RESPONSE: &str = "javax.servlet.http.HttpServletResponse";
pub const SERVLET_EXCEPTION: &str = "javax.servlet.ServletException";
pub const IO_EXCEPTION: &str = "java.io.IOException";

pub const JSP_TAG: &str = "javax.servlet.jsp.tagext.JspTag";
pub const TAG: &str = "javax.servlet.jsp.tagext.Tag";
pub const SIMPLE_TAG: &str = "javax.servlet.jsp.tagext.SimpleTag";
pub const TAG_ADAPTER: &str = "javax.servlet.jsp.tagext.TagAdapter";
pub const ITERATION_TAG: &str = "javax.servlet.jsp.tagext.IterationTag";
pub const BODY_TAG: &str = "javax.servlet.jsp.tagext.BodyTag";
pub const BODY_CONTENT: &str = "javax.servlet.jsp.tagext.BodyContent";
pub const JSP_FRAGMENT: &str = "javax.servlet.jsp.tagext.JspFragment";
pub const JSP_CONTEXT: &str = "javax.servlet.jsp.JspContext";

pub const EL_CONTEXT: &str = "javax.el.ELContext";
pub const EXPRESSION_FACTORY: &str = "javax.el.ExpressionFactory";
pub const VALUE_EXPRESSION: &str = "javax.el.ValueExpression";
pub const METHOD_EXPRESSION: &str = "javax.el.MethodExpression";

// ── Runtime support package ──────────────────────────────────────────────────

pub const RT_PAGE: &str = "tagc.rt.TemplatePage";
pub const RT_EXPR: &str = "tagc.rt.Expr";
pub const RT_COERCE: &str = "tagc.rt.Coerce";
pub const RT_OUT: &str = "tagc.rt.Out";
pub const RT_SCOPES: &str = "tagc.rt.Scopes";
pub const RT_LOOP_STATUS: &str = "tagc.rt.LoopStatus";
pub const RT_STATIC_FRAGMENT: &str = "tagc.rt.StaticFragment";
pub const RT_EL_FRAGMENT: &str = "tagc.rt.ElFragment";
pub const RT_DEPENDENCY: &str = "tagc.rt.Dependency";
pub const RT_PATH_DEPENDENCY: &str = "tagc.rt.PathDependency";
pub const RT_CLASS_DEPENDENCY: &str = "tagc.rt.ClassDependency";

// ══════════════════════════════════════════════════════════════════════════════
// Generated identifiers
// ══════════════════════════════════════════════════════════════════════════════

pub const STATE: &str = "_tpl_state";
pub const STATE_CLASS: &str = "TagState";
pub const ENV: &str = "_tpl_env";
pub const PARENT_TAG: &str = "_tpl_parent_tag";
pub const FRAGMENT_CLASS: &str = "_TplFragment";
pub const SERVICE: &str = "_tpl_service";
pub const SERVICE_IMPL: &str = "_tpl_service_impl";
pub const INIT: &str = "_tpl_init";
pub const DESTROY: &str = "_tpl_destroy";
pub const DEPENDENCIES: &str = "_tpl_dependencies";

// ══════════════════════════════════════════════════════════════════════════════
// Scopes and lifecycle constants
// ══════════════════════════════════════════════════════════════════════════════

/// `page`/`request`/`session`/`application` → the page-context constant.
pub fn scope_constant(scope: &str) -> Option<String> {
    let name = match scope {
        "page" => "PAGE_SCOPE",
        "request" => "REQUEST_SCOPE",
        "session" => "SESSION_SCOPE",
        "application" => "APPLICATION_SCOPE",
        _ => return None,
    };
    Some(format!("{PAGE_CONTEXT}.{name}"))
}

pub fn skip_body() -> String {
    format!("{TAG}.SKIP_BODY")
}

pub fn skip_page() -> String {
    format!("{TAG}.SKIP_PAGE")
}

pub fn eval_body_again() -> String {
    format!("{ITERATION_TAG}.EVAL_BODY_AGAIN")
}

pub fn eval_body_buffered() -> String {
    format!("{BODY_TAG}.EVAL_BODY_BUFFERED")
}

// ══════════════════════════════════════════════════════════════════════════════
// Run-time conversions
// ══════════════════════════════════════════════════════════════════════════════

/// Convert a run-time `String`/`Object` expression to `target`.
pub fn coerce(target: &TargetType, expr: &str) -> String {
    match target {
        TargetType::String => format!("{RT_COERCE}.toString({expr})"),
        TargetType::Object => expr.to_string(),
        TargetType::Primitive(p) => format!("{RT_COERCE}.{}({expr})", coerce_method(*p)),
        TargetType::Boxed(p) => format!(
            "{}.valueOf({RT_COERCE}.{}({expr}))",
            p.boxed_class(),
            coerce_method(*p)
        ),
        other => {
            let class = other.class_name();
            format!("(({class}) {RT_COERCE}.toType({expr}, {class}.class))")
        }
    }
}

fn coerce_method(p: Primitive) -> &'static str {
    match p {
        Primitive::Boolean => "toBoolean",
        Primitive::Byte => "toByte",
        Primitive::Short => "toShort",
        Primitive::Int => "toInt",
        Primitive::Long => "toLong",
        Primitive::Float => "toFloat",
        Primitive::Double => "toDouble",
        Primitive::Char => "toChar",
    }
}

/// Read a page-context attribute as a value of `class`.
///
/// Primitives go through the null-safe coercions: an attribute the handler
/// has not set yet reads as the zero value.
pub fn read_attribute(class: &TargetType, name_literal: &str) -> String {
    let raw = format!("pageContext.findAttribute({name_literal})");
    match class {
        TargetType::Primitive(p) => format!("{RT_COERCE}.{}({raw})", coerce_method(*p)),
        TargetType::Object => raw,
        other => format!("({}) {raw}", other.class_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_constants() {
        assert_eq!(
            scope_constant("session").as_deref(),
            Some("javax.servlet.jsp.PageContext.SESSION_SCOPE")
        );
        assert_eq!(scope_constant("global"), None);
    }

    #[test]
    fn test_coerce_forms() {
        assert_eq!(
            coerce(&TargetType::Primitive(Primitive::Int), "s"),
            "tagc.rt.Coerce.toInt(s)"
        );
        assert_eq!(
            coerce(&TargetType::Boxed(Primitive::Long), "s"),
            "java.lang.Long.valueOf(tagc.rt.Coerce.toLong(s))"
        );
        assert_eq!(
            coerce(&TargetType::Class("java.util.Date".into()), "s"),
            "((java.util.Date) tagc.rt.Coerce.toType(s, java.util.Date.class))"
        );
    }

    #[test]
    fn test_read_attribute() {
        assert_eq!(
            read_attribute(&TargetType::Primitive(Primitive::Int), "\"n\""),
            "tagc.rt.Coerce.toInt(pageContext.findAttribute(\"n\"))"
        );
        assert_eq!(
            read_attribute(&TargetType::Primitive(Primitive::Boolean), "\"b\""),
            "tagc.rt.Coerce.toBoolean(pageContext.findAttribute(\"b\"))"
        );
        assert_eq!(
            read_attribute(&TargetType::String, "\"s\""),
            "(java.lang.String) pageContext.findAttribute(\"s\")"
        );
    }
}
