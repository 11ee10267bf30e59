//! Expression module
//!
//! This module contains the predicate/projection language:
//! - AST
//! - Parser (prefix notation)
//! - Compiler producing computations bound to live records

pub mod ast;
pub mod compile;
pub mod parser;

pub use ast::{BinaryOperator, Expr, UnaryOperator};
pub use compile::{compile, compile_all, CombinedRecord, Computation, RecordComparator};
pub use parser::parse_expr;
