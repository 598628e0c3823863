//! Expression-language lexer: template text to a token stream.
//!
//! Features:
//! - literal text runs with `\${` and `\#{` escapes
//! - `${...}` immediate and `#{...}` deferred expressions via a mode stack
//! - word operators (`and`, `eq`, `div`, ...) as keyword tokens
//! - single- and double-quoted strings with backslash escapes

use crate::error::{ElError, ElResult};
use crate::token::{Token, TokenKind};

/// Lexer mode: scanning template text or the inside of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    /// Inside `${...}` / `#{...}`; `start` is the offset of the opener.
    Expr { start: usize },
}

pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    mode: Mode,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            mode: Mode::Text,
        }
    }

    /// Lex the whole input. The stream always ends with [`TokenKind::Eof`].
    pub fn lex(mut self) -> ElResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = match self.mode {
                Mode::Text => self.scan_text(),
                Mode::Expr { .. } => self.scan_expr()?,
            };
            let Some(token) = token else { continue };
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Cursor helpers
    // ─────────────────────────────────────────────────────────────

    fn rest(&self) -> &'src str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    // ─────────────────────────────────────────────────────────────
    // Text mode
    // ─────────────────────────────────────────────────────────────

    fn scan_text(&mut self) -> Option<Token> {
        let start = self.pos;
        if self.rest().is_empty() {
            return Some(Token::new(TokenKind::Eof, start));
        }
        for (opener, kind) in [("${", TokenKind::ImmediateStart), ("#{", TokenKind::DeferredStart)] {
            if self.rest().starts_with(opener) {
                self.pos += 2;
                self.mode = Mode::Expr { start };
                return Some(Token::new(kind, start));
            }
        }

        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' && (self.rest()[1..].starts_with("${") || self.rest()[1..].starts_with("#{")) {
                self.pos += 1;
                text.push_str(&self.rest()[..2]);
                self.pos += 2;
                continue;
            }
            if self.rest().starts_with("${") || self.rest().starts_with("#{") {
                break;
            }
            text.push(c);
            self.bump();
        }
        if text.is_empty() {
            None
        } else {
            Some(Token::new(TokenKind::Text(text), start))
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Expression mode
    // ─────────────────────────────────────────────────────────────

    fn scan_expr(&mut self) -> ElResult<Option<Token>> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        let start = self.pos;
        let Some(c) = self.peek() else {
            let Mode::Expr { start } = self.mode else {
                return Ok(Some(Token::new(TokenKind::Eof, start)));
            };
            return Err(ElError::UnterminatedExpression(start));
        };

        let single = |kind: TokenKind| Token::new(kind, start);
        let token = match c {
            '}' => {
                self.bump();
                self.mode = Mode::Text;
                single(TokenKind::ExprEnd)
            }
            '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.scan_number()?,
            '0'..='9' => self.scan_number()?,
            '\'' | '"' => self.scan_string(c)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => self.scan_word(),
            _ => {
                let two = self.rest().get(..2).unwrap_or("");
                let (kind, len) = match two {
                    "==" => (TokenKind::EqEq, 2),
                    "!=" => (TokenKind::NotEq, 2),
                    "<=" => (TokenKind::LessEq, 2),
                    ">=" => (TokenKind::GreaterEq, 2),
                    "&&" => (TokenKind::AndAnd, 2),
                    "||" => (TokenKind::OrOr, 2),
                    _ => match c {
                        '.' => (TokenKind::Dot, 1),
                        '[' => (TokenKind::LBracket, 1),
                        ']' => (TokenKind::RBracket, 1),
                        '(' => (TokenKind::LParen, 1),
                        ')' => (TokenKind::RParen, 1),
                        ',' => (TokenKind::Comma, 1),
                        ':' => (TokenKind::Colon, 1),
                        '?' => (TokenKind::Question, 1),
                        '+' => (TokenKind::Plus, 1),
                        '-' => (TokenKind::Minus, 1),
                        '*' => (TokenKind::Star, 1),
                        '/' => (TokenKind::Slash, 1),
                        '%' => (TokenKind::Percent, 1),
                        '<' => (TokenKind::Less, 1),
                        '>' => (TokenKind::Greater, 1),
                        '!' => (TokenKind::Bang, 1),
                        other => {
                            return Err(ElError::UnexpectedChar {
                                ch: other,
                                offset: start,
                            })
                        }
                    },
                };
                self.pos += len;
                single(kind)
            }
        };
        Ok(Some(token))
    }

    fn scan_number(&mut self) -> ElResult<Token> {
        let start = self.pos;
        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        let text = &self.source[start..self.pos];
        let kind = if is_float {
            TokenKind::Float(
                text.parse()
                    .map_err(|_| ElError::InvalidNumber(text.to_string()))?,
            )
        } else {
            TokenKind::Integer(
                text.parse()
                    .map_err(|_| ElError::InvalidNumber(text.to_string()))?,
            )
        };
        Ok(Token::new(kind, start))
    }

    fn scan_string(&mut self, quote: char) -> ElResult<Token> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(ElError::UnterminatedString(start)),
                Some('\\') => match self.bump() {
                    Some(c @ ('\\' | '\'' | '"')) => value.push(c),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return Err(ElError::UnterminatedString(start)),
                },
                Some(c) if c == quote => break,
                Some(c) => value.push(c),
            }
        }
        Ok(Token::new(TokenKind::Str(value), start))
    }

    fn scan_word(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        let word = &self.source[start..self.pos];
        let kind = TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.to_string()));
        Token::new(kind, start)
    }
}
