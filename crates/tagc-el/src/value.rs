//! Runtime values produced by constant evaluation, and their coercions.
//!
//! Coercion follows the expression-language rules: `null` and the empty string
//! become the zero value of the requested type, strings are parsed, and
//! booleans never convert to numbers.

use std::fmt;

use crate::error::{ElError, ElResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "Boolean",
            Value::Long(_) => "Long",
            Value::Double(_) => "Double",
            Value::Str(_) => "String",
        }
    }

    fn coercion(&self, to: &str) -> ElError {
        ElError::Coercion {
            from: match self {
                Value::Str(s) => format!("String \"{s}\""),
                other => other.type_name().to_string(),
            },
            to: to.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `null` or the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Whether arithmetic with this operand is done in floating point.
    pub fn is_floating(&self) -> bool {
        match self {
            Value::Double(_) => true,
            Value::Str(s) => s.contains(['.', 'e', 'E']),
            _ => false,
        }
    }

    // ── Coercions ──

    pub fn to_long(&self) -> ElResult<i64> {
        match self {
            Value::Null => Ok(0),
            Value::Long(n) => Ok(*n),
            Value::Double(d) => Ok(*d as i64),
            Value::Str(s) if s.is_empty() => Ok(0),
            Value::Str(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .or_else(|_| trimmed.parse::<f64>().map(|d| d as i64))
                    .map_err(|_| self.coercion("Long"))
            }
            Value::Bool(_) => Err(self.coercion("Long")),
        }
    }

    pub fn to_double(&self) -> ElResult<f64> {
        match self {
            Value::Null => Ok(0.0),
            Value::Long(n) => Ok(*n as f64),
            Value::Double(d) => Ok(*d),
            Value::Str(s) if s.is_empty() => Ok(0.0),
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| self.coercion("Double")),
            Value::Bool(_) => Err(self.coercion("Double")),
        }
    }

    pub fn to_bool(&self) -> ElResult<bool> {
        match self {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Str(s) => Ok(s.eq_ignore_ascii_case("true")),
            Value::Long(_) | Value::Double(_) => Err(self.coercion("Boolean")),
        }
    }

    pub fn to_char(&self) -> ElResult<char> {
        match self {
            Value::Null => Ok('\0'),
            Value::Str(s) => Ok(s.chars().next().unwrap_or('\0')),
            Value::Long(n) => Ok(char::from_u32(u32::from(*n as u16)).unwrap_or('\u{fffd}')),
            Value::Double(d) => Ok(char::from_u32(u32::from(*d as i64 as u16)).unwrap_or('\u{fffd}')),
            Value::Bool(_) => Err(self.coercion("Character")),
        }
    }

    /// String coercion; never fails.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Number Formatting
// ══════════════════════════════════════════════════════════════════════════════

/// Format a double the way the host platform prints it: plain notation for
/// magnitudes in `[1e-3, 1e7)`, otherwise `d.dddE±n`, always with a fraction.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let magnitude = d.abs();
    if (1e-3..1e7).contains(&magnitude) {
        plain(format!("{d}"))
    } else {
        scientific(format!("{d:e}"))
    }
}

/// Single-precision variant of [`format_double`].
pub fn format_float(f: f32) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let magnitude = f.abs();
    if (1e-3..1e7).contains(&magnitude) {
        plain(format!("{f}"))
    } else {
        scientific(format!("{f:e}"))
    }
}

fn plain(mut text: String) -> String {
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

fn scientific(text: String) -> String {
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let mantissa = plain(mantissa.to_string());
            format!("{mantissa}E{exponent}")
        }
        None => plain(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_double_plain_range() {
        assert_eq!(format_double(1.0), "1.0");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(-100.0), "-100.0");
        assert_eq!(format_double(0.001), "0.001");
        assert_eq!(format_double(1234567.0), "1234567.0");
    }

    #[test]
    fn test_format_double_scientific_range() {
        assert_eq!(format_double(1e7), "1.0E7");
        assert_eq!(format_double(1.5e10), "1.5E10");
        assert_eq!(format_double(1e-5), "1.0E-5");
        assert_eq!(format_double(-2.5e-4), "-2.5E-4");
    }

    #[test]
    fn test_format_double_special_values() {
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::INFINITY), "Infinity");
        assert_eq!(format_double(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_double(0.0), "0.0");
        assert_eq!(format_double(-0.0), "-0.0");
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(3e8), "3.0E8");
    }

    #[test]
    fn test_null_and_empty_coerce_to_zero() {
        for v in [Value::Null, Value::Str(String::new())] {
            assert_eq!(v.to_long().unwrap(), 0);
            assert_eq!(v.to_double().unwrap(), 0.0);
            assert!(!v.to_bool().unwrap());
            assert_eq!(v.to_char().unwrap(), '\0');
            assert_eq!(v.to_text(), "");
        }
    }

    #[test]
    fn test_string_coercions() {
        assert_eq!(Value::Str("42".into()).to_long().unwrap(), 42);
        assert_eq!(Value::Str("4.9".into()).to_long().unwrap(), 4);
        assert_eq!(Value::Str("2.5".into()).to_double().unwrap(), 2.5);
        assert!(Value::Str("TRUE".into()).to_bool().unwrap());
        assert!(!Value::Str("yes".into()).to_bool().unwrap());
        assert!(Value::Str("abc".into()).to_long().is_err());
    }

    #[test]
    fn test_boolean_never_becomes_number() {
        assert!(Value::Bool(true).to_long().is_err());
        assert!(Value::Bool(true).to_double().is_err());
        assert!(Value::Long(1).to_bool().is_err());
    }

    #[test]
    fn test_is_floating() {
        assert!(Value::Double(1.0).is_floating());
        assert!(Value::Str("1e3".into()).is_floating());
        assert!(!Value::Str("13".into()).is_floating());
        assert!(!Value::Long(1).is_floating());
    }
}
