//! Expression-language syntax tree.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
    Identifier(String),
    /// `target.name`
    Property { target: Box<Expr>, name: String },
    /// `target[index]`
    Index { target: Box<Expr>, index: Box<Expr> },
    /// `prefix:name(args)` or `name(args)`
    Call {
        prefix: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `value instanceof Class`; never constant.
    InstanceOf { value: Box<Expr>, class: String },
}

impl Expr {
    /// True when the expression has no free variables, calls or member access,
    /// so it can be evaluated at compile time.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Null | Expr::Bool(_) | Expr::Long(_) | Expr::Double(_) | Expr::Str(_) => true,
            Expr::Identifier(_)
            | Expr::Property { .. }
            | Expr::Index { .. }
            | Expr::Call { .. }
            | Expr::InstanceOf { .. } => false,
            Expr::Unary { operand, .. } => operand.is_constant(),
            Expr::Binary { left, right, .. } => left.is_constant() && right.is_constant(),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => test.is_constant() && then.is_constant() && otherwise.is_constant(),
        }
    }
}

/// One piece of a template value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Part {
    Literal(String),
    /// `${...}`
    Immediate(Expr),
    /// `#{...}`
    Deferred(Expr),
}

/// A parsed attribute value or template-text expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub parts: Vec<Part>,
}

impl Template {
    pub fn has_immediate(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Immediate(_)))
    }

    pub fn has_deferred(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Deferred(_)))
    }

    /// No expressions at all.
    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// Every embedded expression is constant.
    pub fn is_constant(&self) -> bool {
        self.parts.iter().all(|p| match p {
            Part::Literal(_) => true,
            Part::Immediate(e) | Part::Deferred(e) => e.is_constant(),
        })
    }

    /// Concatenated literal text with escapes resolved.
    pub fn literal_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Literal(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
