//! Attribute-value compiler.
//!
//! Turns an attribute value into a source expression of the setter's
//! parameter type. Literals are converted at compile time, constant
//! expressions are folded into literals, and everything else goes through an
//! evaluator slot.
//!
//! Literal conversion is strict: a value that does not fit its target is a
//! compile error rather than a run-time failure.

use tagc_el::{eval_template, format_double, format_float, parse, Template, Value};
use tagc_types::{ErrorCode, NodeId, Primitive, TargetType};

use crate::compiler::{internal, AttrValue, GenContext};
use crate::error::CodegenResult;
use crate::escape::{java_char, java_string};
use crate::fragment::{compile_fragment, FragmentMode, FragmentValue};
use crate::runtime::*;
use crate::tables::SlotKind;

/// One attribute value to compile, with the setter metadata it targets.
#[derive(Debug, Clone, Copy)]
pub struct ValueRequest<'r> {
    /// Element the attribute belongs to; errors point here.
    pub node: NodeId,
    pub attribute: &'r str,
    pub value: &'r AttrValue,
    pub target: &'r TargetType,
    pub rtexpr: bool,
    pub deferred_value: Option<&'r str>,
    pub deferred_method: Option<&'r str>,
    /// Parent-handler expression for fragments created from this value.
    pub parent: &'r str,
}

pub fn compile_value(ctx: &mut GenContext<'_>, req: &ValueRequest<'_>) -> CodegenResult<String> {
    if req.target.is_deferred_carrier()
        || req.deferred_value.is_some()
        || req.deferred_method.is_some()
    {
        return compile_carrier(ctx, req);
    }

    let text = match req.value {
        AttrValue::Body(body) => return compile_body_value(ctx, req, *body),
        AttrValue::Static(text) => text.as_str(),
    };

    if *req.target == TargetType::Fragment {
        return static_fragment(ctx, req, text);
    }

    if let Some(code) = runtime_expression(ctx, req, text)? {
        return Ok(code);
    }

    let literal = if ctx.config.el_ignored {
        text.to_string()
    } else {
        let template = parse_template(ctx, req.node, text)?;
        if template.has_deferred() && !ctx.config.deferred_syntax_allowed_as_literal {
            return Err(ctx.error(
                req.node,
                ErrorCode::DEFERRED_SYNTAX_NOT_ALLOWED,
                format!("attribute '{}' does not accept #{{}} expressions", req.attribute),
            ));
        }
        if template.has_immediate() {
            if !req.rtexpr {
                return Err(ctx.error(
                    req.node,
                    ErrorCode::IMMEDIATE_SYNTAX_NOT_ALLOWED,
                    format!("attribute '{}' does not accept ${{}} expressions", req.attribute),
                ));
            }
            return Ok(compile_expression(ctx, req.target, text, &template));
        }
        if template.is_literal() {
            template.literal_text()
        } else {
            text.to_string()
        }
    };
    convert_literal(ctx, req, &literal)
}

fn parse_template(ctx: &GenContext<'_>, node: NodeId, text: &str) -> CodegenResult<Template> {
    parse(text).map_err(|e| {
        ctx.error(
            node,
            ErrorCode::MALFORMED_EXPRESSION,
            format!("malformed expression \"{text}\": {e}"),
        )
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Value kinds
// ══════════════════════════════════════════════════════════════════════════════

/// Deferred carriers keep their text; the handler evaluates it later.
fn compile_carrier(ctx: &mut GenContext<'_>, req: &ValueRequest<'_>) -> CodegenResult<String> {
    let AttrValue::Static(text) = req.value else {
        return Err(ctx.error(
            req.node,
            ErrorCode::INVALID_ATTRIBUTE_VALUE,
            format!("deferred attribute '{}' cannot be given as a body", req.attribute),
        ));
    };
    let template = parse_template(ctx, req.node, text)?;
    if template.has_immediate() {
        return Err(ctx.error(
            req.node,
            ErrorCode::DEFERRED_SYNTAX_REQUIRED,
            format!("attribute '{}' requires #{{}} syntax", req.attribute),
        ));
    }

    let is_method = *req.target == TargetType::MethodExpression
        || (req.deferred_method.is_some() && *req.target != TargetType::ValueExpression);
    let kind = if is_method {
        let (returns, params) = parse_signature(req.deferred_method.unwrap_or("java.lang.Object invoke()"));
        if template.is_literal() && returns == "void" {
            return Err(ctx.error(
                req.node,
                ErrorCode::VOID_METHOD_LITERAL,
                format!(
                    "attribute '{}' is a void method and cannot be a literal",
                    req.attribute
                ),
            ));
        }
        SlotKind::Method { returns, params }
    } else {
        SlotKind::Value {
            expected: req.deferred_value.unwrap_or("java.lang.Object").to_string(),
        }
    };
    Ok(ctx.tables.slot(kind, text))
}

/// `java.lang.String save(int, java.lang.Object)` → return type and parameter types.
pub fn parse_signature(signature: &str) -> (String, Vec<String>) {
    let signature = signature.trim();
    let (head, args) = match signature.split_once('(') {
        Some((head, rest)) => (head, rest.trim_end().trim_end_matches(')')),
        None => (signature, ""),
    };
    let returns = head
        .split_whitespace()
        .next()
        .unwrap_or("java.lang.Object")
        .to_string();
    let params = args
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();
    (returns, params)
}

fn compile_body_value(
    ctx: &mut GenContext<'_>,
    req: &ValueRequest<'_>,
    body: NodeId,
) -> CodegenResult<String> {
    if *req.target == TargetType::Fragment {
        return match compile_fragment(ctx, body, FragmentMode::Stream, req.parent)? {
            FragmentValue::Expr(expr) => Ok(expr),
            FragmentValue::Text(_) => Err(internal("stream fragment compiled to text")),
        };
    }
    match compile_fragment(ctx, body, FragmentMode::Value, req.parent)? {
        FragmentValue::Text(text) => convert_literal(ctx, req, &text),
        FragmentValue::Expr(expr) if *req.target == TargetType::String => Ok(expr),
        FragmentValue::Expr(expr) => Ok(coerce(req.target, &expr)),
    }
}

/// An inline value for a fragment-typed attribute.
fn static_fragment(ctx: &mut GenContext<'_>, req: &ValueRequest<'_>, text: &str) -> CodegenResult<String> {
    if !ctx.config.el_ignored {
        let template = parse_template(ctx, req.node, text)?;
        if template.has_immediate() {
            let slot = ctx.tables.slot(SlotKind::Expr, text);
            return Ok(format!("{RT_EL_FRAGMENT}.create(pageContext, {slot})"));
        }
        if template.is_literal() {
            return Ok(format!(
                "{RT_STATIC_FRAGMENT}.create(pageContext, {})",
                java_string(&template.literal_text())
            ));
        }
    }
    Ok(format!("{RT_STATIC_FRAGMENT}.create(pageContext, {})", java_string(text)))
}

/// `<%= code %>` as the whole value is passed through verbatim.
fn runtime_expression(
    ctx: &GenContext<'_>,
    req: &ValueRequest<'_>,
    text: &str,
) -> CodegenResult<Option<String>> {
    if !text.contains("<%=") {
        return Ok(None);
    }
    let trimmed = text.trim();
    let whole = trimmed.starts_with("<%=") && trimmed.ends_with("%>") && trimmed.len() >= 5;
    if ctx.config.scripting_invalid {
        return Err(ctx.error(
            req.node,
            ErrorCode::SCRIPTING_NOT_ALLOWED,
            format!("runtime expression in attribute '{}' while scripting is disabled", req.attribute),
        ));
    }
    if !whole || !req.rtexpr {
        return Err(ctx.error(
            req.node,
            ErrorCode::RUNTIME_EXPRESSION_NOT_ALLOWED,
            if whole {
                format!("attribute '{}' does not accept runtime expressions", req.attribute)
            } else {
                format!(
                    "runtime expression in attribute '{}' must be the entire value",
                    req.attribute
                )
            },
        ));
    }
    Ok(Some(format!("({})", trimmed[3..trimmed.len() - 2].trim())))
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// Fold a constant expression, or evaluate through a slot at run time.
fn compile_expression(
    ctx: &mut GenContext<'_>,
    target: &TargetType,
    text: &str,
    template: &Template,
) -> String {
    if template.is_constant() && !template.has_deferred() {
        match eval_template(template) {
            Ok(value) => {
                if let Some(literal) = fold_literal(target, &value) {
                    return literal;
                }
                tracing::debug!(expr = text, target = %target, "constant does not fit, using evaluator slot");
            }
            Err(e) => {
                tracing::debug!(expr = text, error = %e, "constant folding failed, using evaluator slot");
            }
        }
    }
    let slot = ctx.tables.slot(SlotKind::Expr, text);
    slot_call(target, &slot)
}

/// Value of a literal or constant template, if known at compile time.
pub fn constant_value(ctx: &GenContext<'_>, text: &str) -> Option<Value> {
    if ctx.config.el_ignored {
        return Some(Value::Str(text.to_string()));
    }
    let template = parse(text).ok()?;
    if template.has_deferred() {
        return None;
    }
    if template.is_literal() {
        return Some(Value::Str(template.literal_text()));
    }
    if !template.is_constant() {
        return None;
    }
    eval_template(&template).ok()
}

/// Source expression for a folded constant, or `None` to keep the slot.
pub fn fold_literal(target: &TargetType, value: &Value) -> Option<String> {
    match target {
        TargetType::String => Some(java_string(&value.to_text())),
        TargetType::Object => Some(match value {
            Value::Null => "null".to_string(),
            Value::Bool(true) => "java.lang.Boolean.TRUE".to_string(),
            Value::Bool(false) => "java.lang.Boolean.FALSE".to_string(),
            Value::Long(n) => format!("java.lang.Long.valueOf({n}L)"),
            Value::Double(d) => format!("java.lang.Double.valueOf({})", double_literal(*d)),
            Value::Str(s) => java_string(s),
        }),
        TargetType::Primitive(p) => primitive_from_value(*p, value),
        TargetType::Boxed(p) => {
            if value.is_null() {
                return Some(boxed_zero(*p));
            }
            Some(boxed(*p, &primitive_from_value(*p, value)?))
        }
        TargetType::BigInteger => match value {
            Value::Null => Some("java.math.BigInteger.ZERO".to_string()),
            other => Some(format!("java.math.BigInteger.valueOf({}L)", other.to_long().ok()?)),
        },
        TargetType::BigDecimal => match value {
            Value::Null => Some("java.math.BigDecimal.ZERO".to_string()),
            Value::Long(n) => Some(format!("java.math.BigDecimal.valueOf({n}L)")),
            other => {
                let d = other.to_double().ok()?;
                d.is_finite()
                    .then(|| format!("new java.math.BigDecimal({})", java_string(&format_double(d))))
            }
        },
        TargetType::Class(_) if value.is_null() => Some("null".to_string()),
        _ => None,
    }
}

fn primitive_from_value(p: Primitive, value: &Value) -> Option<String> {
    Some(match p {
        Primitive::Boolean => value.to_bool().ok()?.to_string(),
        Primitive::Byte => format!("(byte) {}", i8::try_from(value.to_long().ok()?).ok()?),
        Primitive::Short => format!("(short) {}", i16::try_from(value.to_long().ok()?).ok()?),
        Primitive::Int => i32::try_from(value.to_long().ok()?).ok()?.to_string(),
        Primitive::Long => format!("{}L", value.to_long().ok()?),
        Primitive::Float => float_literal(value.to_double().ok()? as f32),
        Primitive::Double => double_literal(value.to_double().ok()?),
        Primitive::Char => java_char(value.to_char().ok()?)?,
    })
}

/// Run-time evaluation of slot `slot` as `target`.
pub fn slot_call(target: &TargetType, slot: &str) -> String {
    let eval = |method: &str| format!("{slot}.{method}({ENV})");
    match target {
        TargetType::String => eval("evalString"),
        TargetType::Primitive(p) => primitive_call(*p, slot),
        TargetType::Boxed(Primitive::Boolean) => {
            format!("java.lang.Boolean.valueOf({})", eval("evalBoolean"))
        }
        TargetType::Boxed(p) => boxed(*p, &primitive_call(*p, slot)),
        TargetType::BigInteger => eval("evalBigInteger"),
        TargetType::BigDecimal => eval("evalBigDecimal"),
        TargetType::Class(class) => format!("({class}) {slot}.evalObject({ENV}, {class}.class)"),
        _ => eval("evalObject"),
    }
}

fn primitive_call(p: Primitive, slot: &str) -> String {
    match p {
        Primitive::Boolean => format!("{slot}.evalBoolean({ENV})"),
        Primitive::Byte => format!("(byte) {slot}.evalLong({ENV})"),
        Primitive::Short => format!("(short) {slot}.evalLong({ENV})"),
        Primitive::Int => format!("(int) {slot}.evalLong({ENV})"),
        Primitive::Long => format!("{slot}.evalLong({ENV})"),
        Primitive::Float => format!("(float) {slot}.evalDouble({ENV})"),
        Primitive::Double => format!("{slot}.evalDouble({ENV})"),
        Primitive::Char => format!("{slot}.evalCharacter({ENV})"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

/// Convert literal attribute text to a typed source literal.
fn convert_literal(ctx: &GenContext<'_>, req: &ValueRequest<'_>, text: &str) -> CodegenResult<String> {
    let converted = match req.target {
        TargetType::String | TargetType::Object => Some(java_string(text)),
        TargetType::Primitive(p) => parse_primitive(*p, text),
        TargetType::Boxed(p) if text.trim().is_empty() => Some(boxed_zero(*p)),
        TargetType::Boxed(Primitive::Boolean) => parse_primitive(Primitive::Boolean, text).map(|b| {
            if b == "true" {
                "java.lang.Boolean.TRUE".to_string()
            } else {
                "java.lang.Boolean.FALSE".to_string()
            }
        }),
        TargetType::Boxed(p) => parse_primitive(*p, text).map(|lit| boxed(*p, &lit)),
        TargetType::BigInteger => big_integer(text.trim()),
        TargetType::BigDecimal => big_decimal(text.trim()),
        TargetType::Class(class) => Some(format!(
            "(({class}) {RT_COERCE}.fromText({class}.class, {}))",
            java_string(text)
        )),
        TargetType::Fragment | TargetType::ValueExpression | TargetType::MethodExpression => {
            return Err(internal(format!(
                "literal conversion requested for {}",
                req.target.class_name()
            )));
        }
    };
    converted.ok_or_else(|| {
        ctx.error(
            req.node,
            ErrorCode::LITERAL_COERCION_FAILED,
            format!(
                "attribute '{}': cannot convert \"{text}\" to {}",
                req.attribute, req.target
            ),
        )
    })
}

/// Strict literal parsing; `None` when the text does not fit.
pub fn parse_primitive(p: Primitive, text: &str) -> Option<String> {
    if p == Primitive::Char {
        let mut chars = text.chars();
        return match (chars.next(), chars.next()) {
            (None, _) => Some("'\\0'".to_string()),
            (Some(c), None) => java_char(c),
            _ => None,
        };
    }

    let t = text.trim();
    if t.is_empty() {
        return Some(match p {
            Primitive::Byte => "(byte) 0".to_string(),
            Primitive::Short => "(short) 0".to_string(),
            other => other.zero().to_string(),
        });
    }
    match p {
        Primitive::Boolean if t.eq_ignore_ascii_case("true") => Some("true".to_string()),
        Primitive::Boolean if t.eq_ignore_ascii_case("false") => Some("false".to_string()),
        Primitive::Boolean => None,
        Primitive::Byte => t.parse::<i8>().ok().map(|n| format!("(byte) {n}")),
        Primitive::Short => t.parse::<i16>().ok().map(|n| format!("(short) {n}")),
        Primitive::Int => t.parse::<i32>().ok().map(|n| n.to_string()),
        Primitive::Long => t.parse::<i64>().ok().map(|n| format!("{n}L")),
        Primitive::Float => match special_float(t) {
            Some(d) => Some(float_literal(d as f32)),
            None => {
                let f = plain_decimal(t)?.parse::<f32>().ok()?;
                f.is_finite().then(|| float_literal(f))
            }
        },
        Primitive::Double => match special_float(t) {
            Some(d) => Some(double_literal(d)),
            None => {
                let d = plain_decimal(t)?.parse::<f64>().ok()?;
                d.is_finite().then(|| double_literal(d))
            }
        },
        Primitive::Char => None,
    }
}

fn special_float(t: &str) -> Option<f64> {
    match t {
        "NaN" => Some(f64::NAN),
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// Decimal text with an optional `f`/`d` suffix stripped; rejects Rust-only forms.
fn plain_decimal(t: &str) -> Option<&str> {
    let body = t
        .strip_suffix(|c: char| matches!(c, 'f' | 'F' | 'd' | 'D'))
        .unwrap_or(t);
    let valid = !body.is_empty()
        && body.chars().any(|c| c.is_ascii_digit())
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    valid.then_some(body)
}

fn float_literal(f: f32) -> String {
    if f.is_nan() {
        "java.lang.Float.NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "java.lang.Float.POSITIVE_INFINITY".to_string()
        } else {
            "java.lang.Float.NEGATIVE_INFINITY".to_string()
        }
    } else {
        format!("{}f", format_float(f))
    }
}

fn double_literal(d: f64) -> String {
    if d.is_nan() {
        "java.lang.Double.NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 {
            "java.lang.Double.POSITIVE_INFINITY".to_string()
        } else {
            "java.lang.Double.NEGATIVE_INFINITY".to_string()
        }
    } else {
        format_double(d)
    }
}

fn boxed(p: Primitive, literal: &str) -> String {
    format!("{}.valueOf({literal})", p.boxed_class())
}

fn boxed_zero(p: Primitive) -> String {
    match p {
        Primitive::Boolean => "java.lang.Boolean.FALSE".to_string(),
        Primitive::Byte => boxed(p, "(byte) 0"),
        Primitive::Short => boxed(p, "(short) 0"),
        other => boxed(other, other.zero()),
    }
}

fn big_integer(t: &str) -> Option<String> {
    if t.is_empty() {
        return Some("java.math.BigInteger.ZERO".to_string());
    }
    let digits = t.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(t);
    (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .then(|| format!("new java.math.BigInteger({})", java_string(t)))
}

fn big_decimal(t: &str) -> Option<String> {
    if t.is_empty() {
        return Some("java.math.BigDecimal.ZERO".to_string());
    }
    let valid = t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && t.chars().any(|c| c.is_ascii_digit())
        && t.parse::<f64>().is_ok_and(f64::is_finite);
    valid.then(|| format!("new java.math.BigDecimal({})", java_string(t)))
}
