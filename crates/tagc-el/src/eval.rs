//! Compile-time evaluation of constant expressions.
//!
//! Only literal operands are allowed; identifiers, member access, calls and
//! `instanceof` report [`ElError::NotConstant`] so the caller can fall back to
//! a runtime evaluation slot.

use std::cmp::Ordering;

use crate::ast::{BinOp, Expr, Part, Template, UnaryOp};
use crate::error::{ElError, ElResult};
use crate::value::Value;

/// Evaluate a whole template. A template that is exactly one expression yields
/// that expression's value; anything else concatenates to a string.
pub fn eval_template(template: &Template) -> ElResult<Value> {
    if let [Part::Immediate(expr) | Part::Deferred(expr)] = template.parts.as_slice() {
        return eval(expr);
    }
    let mut out = String::new();
    for part in &template.parts {
        match part {
            Part::Literal(text) => out.push_str(text),
            Part::Immediate(expr) | Part::Deferred(expr) => out.push_str(&eval(expr)?.to_text()),
        }
    }
    Ok(Value::Str(out))
}

pub fn eval(expr: &Expr) -> ElResult<Value> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Long(n) => Ok(Value::Long(*n)),
        Expr::Double(d) => Ok(Value::Double(*d)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Identifier(name) => Err(ElError::NotConstant(name.clone())),
        Expr::Property { name, .. } => Err(ElError::NotConstant(format!(".{name}"))),
        Expr::Index { .. } => Err(ElError::NotConstant("[...]".to_string())),
        Expr::Call { prefix, name, .. } => Err(ElError::NotConstant(match prefix {
            Some(p) => format!("{p}:{name}()"),
            None => format!("{name}()"),
        })),
        Expr::InstanceOf { class, .. } => Err(ElError::NotConstant(format!("instanceof {class}"))),
        Expr::Unary { op, operand } => eval_unary(*op, eval(operand)?),
        Expr::Binary { op, left, right } => eval_binary(*op, left, right),
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            if eval(test)?.to_bool()? {
                eval(then)
            } else {
                eval(otherwise)
            }
        }
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> ElResult<Value> {
    match op {
        UnaryOp::Empty => Ok(Value::Bool(value.is_empty())),
        UnaryOp::Not => Ok(Value::Bool(!value.to_bool()?)),
        UnaryOp::Neg => match value {
            Value::Null => Ok(Value::Long(0)),
            Value::Long(n) => Ok(Value::Long(n.wrapping_neg())),
            Value::Double(d) => Ok(Value::Double(-d)),
            ref s @ Value::Str(_) if s.is_floating() => Ok(Value::Double(-s.to_double()?)),
            ref s @ Value::Str(_) => Ok(Value::Long(s.to_long()?.wrapping_neg())),
            Value::Bool(_) => Err(ElError::Coercion {
                from: "Boolean".to_string(),
                to: "Number".to_string(),
            }),
        },
    }
}

fn eval_binary(op: BinOp, left: &Expr, right: &Expr) -> ElResult<Value> {
    // Short-circuit before touching the right operand.
    match op {
        BinOp::And => {
            if !eval(left)?.to_bool()? {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(right)?.to_bool()?));
        }
        BinOp::Or => {
            if eval(left)?.to_bool()? {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(right)?.to_bool()?));
        }
        _ => {}
    }

    let a = eval(left)?;
    let b = eval(right)?;
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => arithmetic(op, &a, &b),
        BinOp::Div => {
            if a.is_null() && b.is_null() {
                return Ok(Value::Long(0));
            }
            Ok(Value::Double(a.to_double()? / b.to_double()?))
        }
        BinOp::Mod => {
            if a.is_null() && b.is_null() {
                return Ok(Value::Long(0));
            }
            if a.is_floating() || b.is_floating() {
                return Ok(Value::Double(a.to_double()? % b.to_double()?));
            }
            let divisor = b.to_long()?;
            if divisor == 0 {
                return Err(ElError::DivisionByZero);
            }
            Ok(Value::Long(a.to_long()?.wrapping_rem(divisor)))
        }
        BinOp::Eq => Ok(Value::Bool(equals(&a, &b)?)),
        BinOp::Ne => Ok(Value::Bool(!equals(&a, &b)?)),
        BinOp::Lt => Ok(Value::Bool(compare(&a, &b)? == Some(Ordering::Less))),
        BinOp::Gt => Ok(Value::Bool(compare(&a, &b)? == Some(Ordering::Greater))),
        BinOp::Le => Ok(Value::Bool(matches!(
            compare(&a, &b)?,
            Some(Ordering::Less | Ordering::Equal)
        ))),
        BinOp::Ge => Ok(Value::Bool(matches!(
            compare(&a, &b)?,
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn arithmetic(op: BinOp, a: &Value, b: &Value) -> ElResult<Value> {
    if a.is_null() && b.is_null() {
        return Ok(Value::Long(0));
    }
    if a.is_floating() || b.is_floating() {
        let (x, y) = (a.to_double()?, b.to_double()?);
        return Ok(Value::Double(match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            _ => x * y,
        }));
    }
    let (x, y) = (a.to_long()?, b.to_long()?);
    Ok(Value::Long(match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        _ => x.wrapping_mul(y),
    }))
}

fn equals(a: &Value, b: &Value) -> ElResult<bool> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Double(_), _) | (_, Value::Double(_)) => Ok(a.to_double()? == b.to_double()?),
        (Value::Long(_), _) | (_, Value::Long(_)) => Ok(a.to_long()? == b.to_long()?),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => Ok(a.to_bool()? == b.to_bool()?),
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
    }
}

/// Ordering for the relational operators; `None` when either side is null.
fn compare(a: &Value, b: &Value) -> ElResult<Option<Ordering>> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => Err(ElError::Coercion {
            from: "Boolean".to_string(),
            to: "Comparable".to_string(),
        }),
        (Value::Double(_), _) | (_, Value::Double(_)) => {
            Ok(a.to_double()?.partial_cmp(&b.to_double()?))
        }
        (Value::Long(_), _) | (_, Value::Long(_)) => Ok(Some(a.to_long()?.cmp(&b.to_long()?))),
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn fold(source: &str) -> ElResult<Value> {
        eval_template(&parse(source).unwrap())
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(fold("${1 + 2 * 3}").unwrap(), Value::Long(7));
        assert_eq!(fold("${10 - 4}").unwrap(), Value::Long(6));
        assert_eq!(fold("${7 mod 3}").unwrap(), Value::Long(1));
    }

    #[test]
    fn test_division_is_floating() {
        assert_eq!(fold("${6 / 3}").unwrap(), Value::Double(2.0));
        assert_eq!(fold("${1 div 0}").unwrap(), Value::Double(f64::INFINITY));
    }

    #[test]
    fn test_integer_modulo_by_zero_fails() {
        assert_eq!(fold("${1 % 0}").unwrap_err(), ElError::DivisionByZero);
    }

    #[test]
    fn test_string_operands_follow_their_shape() {
        assert_eq!(fold("${'2' + 3}").unwrap(), Value::Long(5));
        assert_eq!(fold("${'2.5' + 1}").unwrap(), Value::Double(3.5));
        assert_eq!(fold("${null + null}").unwrap(), Value::Long(0));
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(fold("${1 lt 2 and 'a' < 'b'}").unwrap(), Value::Bool(true));
        assert_eq!(fold("${'1' == 1}").unwrap(), Value::Bool(true));
        assert_eq!(fold("${null == null}").unwrap(), Value::Bool(true));
        assert_eq!(fold("${null < 1}").unwrap(), Value::Bool(false));
        assert_eq!(fold("${not empty ''}").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_short_circuit_skips_runtime_operand() {
        assert_eq!(fold("${false and x}").unwrap(), Value::Bool(false));
        assert_eq!(fold("${true or x.y}").unwrap(), Value::Bool(true));
        assert!(matches!(fold("${true and x}"), Err(ElError::NotConstant(_))));
    }

    #[test]
    fn test_mixed_template_concatenates() {
        assert_eq!(
            fold("a${1 + 1}b${2.5}").unwrap(),
            Value::Str("a2b2.5".into())
        );
        assert_eq!(fold("plain").unwrap(), Value::Str("plain".into()));
        assert_eq!(fold("").unwrap(), Value::Str(String::new()));
    }

    #[test]
    fn test_conditional() {
        assert_eq!(fold("${1 > 2 ? 'x' : 'y'}").unwrap(), Value::Str("y".into()));
    }

    #[test]
    fn test_runtime_references_are_not_constant() {
        for source in ["${user}", "${a.b}", "${a[0]}", "${fn:trim(' ')}", "${x instanceof Foo}"] {
            assert!(matches!(fold(source), Err(ElError::NotConstant(_))), "{source}");
        }
    }

    #[test]
    fn test_boolean_arithmetic_fails() {
        assert!(matches!(fold("${true + 1}"), Err(ElError::Coercion { .. })));
        assert!(matches!(fold("${-true}"), Err(ElError::Coercion { .. })));
    }
}
