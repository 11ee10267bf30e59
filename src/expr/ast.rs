//! Expression Abstract Syntax Tree (AST)
//!
//! This module defines the AST nodes for predicate and projection expressions.

use std::fmt;

use crate::storage::value::AttVal;

/// An expression over the attributes of one or more records
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Attribute reference by name
    Attribute(String),
    /// Literal value
    Literal(AttVal),
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
}

impl Expr {
    /// Names of every attribute referenced, in order of appearance
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Attribute(name) => out.push(name),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_attributes(out);
                right.collect_attributes(out);
            }
            Expr::UnaryOp { expr, .. } => expr.collect_attributes(out),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOperator {
    /// Whether this is one of the six comparisons
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Neq
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Lte
                | BinaryOperator::Gte
        )
    }

    /// The operator's symbol in expression text
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::Neq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Logical negation
    Not,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Attribute(name) => write!(f, "[{}]", name),
            Expr::Literal(value) => match value {
                AttVal::Int(i) => write!(f, "int[{}]", i),
                AttVal::Double(d) => write!(f, "double[{:?}]", d),
                AttVal::String(s) => write!(f, "string[{}]", s),
                AttVal::Bool(b) => write!(f, "bool[{}]", b),
            },
            Expr::BinaryOp { op, left, right } => {
                write!(f, "{} ({}, {})", op.symbol(), left, right)
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => write!(f, "! ({})", expr),
        }
    }
}
