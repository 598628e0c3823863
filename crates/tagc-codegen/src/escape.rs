//! Quoting for generated literals and compile-time XML escaping.

use std::fmt::Write;

/// Quoted string literal with every non-printable or non-ASCII character escaped.
pub fn java_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        push_escaped(&mut out, c, '"');
    }
    out.push('"');
    out
}

/// Quoted character literal. Characters outside the basic plane do not fit.
pub fn java_char(c: char) -> Option<String> {
    if c.len_utf16() != 1 {
        return None;
    }
    let mut out = String::from("'");
    push_escaped(&mut out, c, '\'');
    out.push('\'');
    Some(out)
}

fn push_escaped(out: &mut String, c: char, quote: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\u{8}' => out.push_str("\\b"),
        '\u{c}' => out.push_str("\\f"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        ' '..='~' => out.push(c),
        c => {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
}

/// XML-escape text the way the output helper does at run time.
pub fn xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#034;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Turn an arbitrary name into an identifier fragment.
pub fn identifier_part(name: &str) -> String {
    let part: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if part.is_empty() {
        "tag".to_string()
    } else {
        part
    }
}

/// Whether `name` can be used as a variable name in generated code.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

/// Whether `name` can be declared as a local in the generated routines:
/// an identifier that shadows neither an implicit object nor a generated name.
pub fn is_variable_name(name: &str) -> bool {
    is_identifier(name) && !IMPLICIT_LOCALS.contains(&name) && !name.starts_with("_tpl_")
}

const IMPLICIT_LOCALS: &[&str] = &[
    "out", "pageContext", "application", "config", "page", "session", "exception", "request",
    "response",
];

const RESERVED: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while", "true", "false", "null",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_string() {
        assert_eq!(java_string("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(java_string("é"), r#""\u00e9""#);
        assert_eq!(java_string("😀"), r#""\ud83d\ude00""#);
    }

    #[test]
    fn test_java_char() {
        assert_eq!(java_char('x').as_deref(), Some("'x'"));
        assert_eq!(java_char('\'').as_deref(), Some(r"'\''"));
        assert_eq!(java_char('"').as_deref(), Some("'\"'"));
        assert_eq!(java_char('😀'), None);
    }

    #[test]
    fn test_xml() {
        assert_eq!(xml(r#"<a href="x">&'"#), "&lt;a href=&#034;x&#034;&gt;&amp;&#039;");
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("item"));
        assert!(is_identifier("$row_2"));
        assert!(!is_identifier("2row"));
        assert!(!is_identifier("class"));
        assert!(!is_identifier("a-b"));
        assert!(is_identifier("out"));
        assert!(is_variable_name("item"));
        assert!(!is_variable_name("out"));
        assert!(!is_variable_name("pageContext"));
        assert!(!is_variable_name("_tpl_state"));
        assert!(!is_variable_name("class"));
        assert_eq!(identifier_part("my-tag"), "my_tag");
    }
}
