//! Expression-language parser with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 7. `? :`
//! 6. `||` / `or`
//! 5. `&&` / `and`
//! 4. `==`, `!=` (and word forms)
//! 3. `<`, `>`, `<=`, `>=` (and word forms), `instanceof`
//! 2. `+`, `-`
//! 1. `*`, `/`, `%` (and `div`, `mod`)
//! 0. unary `-`, `!`, `empty`; postfix `.name`, `[index]`, calls

use crate::ast::{BinOp, Expr, Part, Template, UnaryOp};
use crate::error::{ElError, ElResult};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Maximum nesting depth of parenthesised or unary expressions.
const MAX_DEPTH: u32 = 64;

/// Parse a template value: literal text mixed with `${}` and `#{}` expressions.
pub fn parse(source: &str) -> ElResult<Template> {
    let tokens = Lexer::new(source).lex()?;
    Parser::new(tokens).parse_template()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.offset)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ElResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> ElError {
        ElError::UnexpectedToken {
            found: self.peek().to_string(),
            expected: expected.to_string(),
            offset: self.offset(),
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Template
    // ══════════════════════════════════════════════════════════════════════════

    pub fn parse_template(&mut self) -> ElResult<Template> {
        let mut parts = Vec::new();
        loop {
            match self.advance() {
                TokenKind::Eof => break,
                TokenKind::Text(text) => parts.push(Part::Literal(text)),
                opener @ (TokenKind::ImmediateStart | TokenKind::DeferredStart) => {
                    if self.peek() == &TokenKind::ExprEnd {
                        return Err(ElError::EmptyExpression(self.offset()));
                    }
                    let expr = self.parse_expression()?;
                    self.expect(&TokenKind::ExprEnd)?;
                    parts.push(if opener == TokenKind::ImmediateStart {
                        Part::Immediate(expr)
                    } else {
                        Part::Deferred(expr)
                    });
                }
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected("text or expression"));
                }
            }
        }
        Ok(Template { parts })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    pub fn parse_expression(&mut self) -> ElResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.unexpected("a shallower expression"));
        }
        let result = self.parse_conditional();
        self.depth -= 1;
        result
    }

    /// `Cond = Or [ "?" Cond ":" Cond ]`
    fn parse_conditional(&mut self) -> ElResult<Expr> {
        let test = self.parse_or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let then = self.parse_conditional()?;
        self.expect(&TokenKind::Colon)?;
        let otherwise = self.parse_conditional()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary_chain(
        &mut self,
        next: fn(&mut Self) -> ElResult<Expr>,
        ops: &[(TokenKind, BinOp)],
    ) -> ElResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_or(&mut self) -> ElResult<Expr> {
        self.binary_chain(Self::parse_and, &[(TokenKind::OrOr, BinOp::Or)])
    }

    fn parse_and(&mut self) -> ElResult<Expr> {
        self.binary_chain(Self::parse_equality, &[(TokenKind::AndAnd, BinOp::And)])
    }

    fn parse_equality(&mut self) -> ElResult<Expr> {
        self.binary_chain(
            Self::parse_relational,
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::NotEq, BinOp::Ne)],
        )
    }

    fn parse_relational(&mut self) -> ElResult<Expr> {
        let mut left = self.binary_chain(
            Self::parse_additive,
            &[
                (TokenKind::LessEq, BinOp::Le),
                (TokenKind::GreaterEq, BinOp::Ge),
                (TokenKind::Less, BinOp::Lt),
                (TokenKind::Greater, BinOp::Gt),
            ],
        )?;
        while self.eat(&TokenKind::Instanceof) {
            let class = self.parse_class_name()?;
            left = Expr::InstanceOf {
                value: Box::new(left),
                class,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ElResult<Expr> {
        self.binary_chain(
            Self::parse_multiplicative,
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> ElResult<Expr> {
        self.binary_chain(
            Self::parse_unary,
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
        )
    }

    fn parse_unary(&mut self) -> ElResult<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Empty => UnaryOp::Empty,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.unexpected("a shallower expression"));
        }
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn parse_postfix(&mut self) -> ElResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                match self.advance() {
                    TokenKind::Identifier(name) => {
                        expr = Expr::Property {
                            target: Box::new(expr),
                            name,
                        }
                    }
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected("property name"));
                    }
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(&TokenKind::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> ElResult<Expr> {
        let expr = match self.advance() {
            TokenKind::Null => Expr::Null,
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::Integer(n) => Expr::Long(n),
            TokenKind::Float(n) => Expr::Double(n),
            TokenKind::Str(s) => Expr::Str(s),
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                inner
            }
            TokenKind::Identifier(name) => {
                if self.peek() == &TokenKind::Colon
                    && matches!(
                        self.tokens.get(self.pos + 1).map(|t| &t.kind),
                        Some(TokenKind::Identifier(_))
                    )
                    && matches!(
                        self.tokens.get(self.pos + 2).map(|t| &t.kind),
                        Some(TokenKind::LParen)
                    )
                {
                    self.advance();
                    let TokenKind::Identifier(local) = self.advance() else {
                        return Err(self.unexpected("function name"));
                    };
                    self.advance();
                    let args = self.parse_arguments()?;
                    Expr::Call {
                        prefix: Some(name),
                        name: local,
                        args,
                    }
                } else if self.eat(&TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    Expr::Call {
                        prefix: None,
                        name,
                        args,
                    }
                } else {
                    Expr::Identifier(name)
                }
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.unexpected("an expression"));
            }
        };
        Ok(expr)
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_arguments(&mut self) -> ElResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma)?;
        }
    }

    fn parse_class_name(&mut self) -> ElResult<String> {
        let mut name = match self.advance() {
            TokenKind::Identifier(n) => n,
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("class name"));
            }
        };
        while self.eat(&TokenKind::Dot) {
            match self.advance() {
                TokenKind::Identifier(n) => {
                    name.push('.');
                    name.push_str(&n);
                }
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected("class name"));
                }
            }
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        let template = parse(source).unwrap();
        match template.parts.into_iter().next() {
            Some(Part::Immediate(e)) | Some(Part::Deferred(e)) => e,
            other => panic!("expected an expression, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            expr("${1 + 2 * 3}"),
            Expr::Binary {
                op: BinOp::Add,
                left: Box::new(Expr::Long(1)),
                right: Box::new(Expr::Binary {
                    op: BinOp::Mul,
                    left: Box::new(Expr::Long(2)),
                    right: Box::new(Expr::Long(3)),
                }),
            }
        );
    }

    #[test]
    fn test_member_access_and_calls() {
        assert_eq!(
            expr("${fn:length(user.names[0])}"),
            Expr::Call {
                prefix: Some("fn".into()),
                name: "length".into(),
                args: vec![Expr::Index {
                    target: Box::new(Expr::Property {
                        target: Box::new(Expr::Identifier("user".into())),
                        name: "names".into(),
                    }),
                    index: Box::new(Expr::Long(0)),
                }],
            }
        );
    }

    #[test]
    fn test_conditional_and_unary() {
        let e = expr("${empty x ? -1 : !true}");
        assert!(matches!(e, Expr::Conditional { .. }));
        assert!(!e.is_constant());
        assert!(expr("${true ? -1 : 2}").is_constant());
    }

    #[test]
    fn test_template_parts() {
        let t = parse("Hi ${name}, #{bean.save}!").unwrap();
        assert_eq!(t.parts.len(), 5);
        assert!(t.has_immediate());
        assert!(t.has_deferred());
        assert!(!t.is_literal());
        assert_eq!(t.literal_text(), "Hi , !");
    }

    #[test]
    fn test_empty_expression_is_rejected() {
        assert_eq!(parse("a ${}").unwrap_err(), ElError::EmptyExpression(4));
    }

    #[test]
    fn test_trailing_operator_is_rejected() {
        let err = parse("${1 +}").unwrap_err();
        assert!(matches!(err, ElError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_instanceof() {
        let e = expr("${x instanceof java.util.List}");
        assert_eq!(
            e,
            Expr::InstanceOf {
                value: Box::new(Expr::Identifier("x".into())),
                class: "java.util.List".into(),
            }
        );
    }
}
