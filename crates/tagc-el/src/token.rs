//! Token types for the expression-language lexer.
//!
//! Template text and expression tokens share one stream: literal runs come
//! out as [`TokenKind::Text`], delimited by `${`/`#{` and the closing `}`.

use std::fmt;

/// Word operators and literals reserved by the language.
pub const KEYWORDS: &[&str] = &[
    "and", "or", "not", "eq", "ne", "lt", "gt", "le", "ge", "true", "false", "null", "empty",
    "div", "mod", "instanceof",
];

/// A single token with its byte offset in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Template level ──
    /// Literal template text, escapes already resolved.
    Text(String),
    /// `${`
    ImmediateStart,
    /// `#{`
    DeferredStart,
    /// Closing `}` of an expression.
    ExprEnd,

    // ── Literals ──
    Integer(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Identifier(String),

    // ── Punctuation ──
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Question,

    // ── Operators ──
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    AndAnd,
    OrOr,
    Bang,
    Empty,
    Instanceof,

    Eof,
}

impl TokenKind {
    /// Map a word to its keyword token, if it is one.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "and" => TokenKind::AndAnd,
            "or" => TokenKind::OrOr,
            "not" => TokenKind::Bang,
            "eq" => TokenKind::EqEq,
            "ne" => TokenKind::NotEq,
            "lt" => TokenKind::Less,
            "gt" => TokenKind::Greater,
            "le" => TokenKind::LessEq,
            "ge" => TokenKind::GreaterEq,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "empty" => TokenKind::Empty,
            "div" => TokenKind::Slash,
            "mod" => TokenKind::Percent,
            "instanceof" => TokenKind::Instanceof,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Text(t) => write!(f, "text \"{t}\""),
            TokenKind::ImmediateStart => write!(f, "'${{'"),
            TokenKind::DeferredStart => write!(f, "'#{{'"),
            TokenKind::ExprEnd => write!(f, "'}}'"),
            TokenKind::Integer(n) => write!(f, "{n}"),
            TokenKind::Float(n) => write!(f, "{n}"),
            TokenKind::Str(s) => write!(f, "'{s}'"),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Identifier(name) => write!(f, "identifier '{name}'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Question => write!(f, "'?'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::Less => write!(f, "'<'"),
            TokenKind::Greater => write!(f, "'>'"),
            TokenKind::LessEq => write!(f, "'<='"),
            TokenKind::GreaterEq => write!(f, "'>='"),
            TokenKind::AndAnd => write!(f, "'&&'"),
            TokenKind::OrOr => write!(f, "'||'"),
            TokenKind::Bang => write!(f, "'!'"),
            TokenKind::Empty => write!(f, "empty"),
            TokenKind::Instanceof => write!(f, "instanceof"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}
