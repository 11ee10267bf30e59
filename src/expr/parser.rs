//! Expression parser
//!
//! Parses the prefix notation used for predicates and projections:
//!
//! ```text
//! [l_orderkey]                          attribute
//! int[5]  double[1.5]  string[abc]      literals
//! bool[true]
//! ! (expr)                              negation
//! == ([a], int[1])                      binary operator applied to two operands
//! ```
//!
//! Whitespace may appear between any two tokens.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    number::complete::double,
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};

use super::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{Error, Result};
use crate::storage::value::AttVal;

/// Parse a complete expression
pub fn parse_expr(text: &str) -> Result<Expr> {
    match all_consuming(delimited(multispace0, expr, multispace0))(text) {
        Ok((_, parsed)) => Ok(parsed),
        Err(err) => Err(Error::Compile {
            expr: text.to_string(),
            message: describe(text, err),
        }),
    }
}

fn describe(text: &str, err: nom::Err<nom::error::Error<&str>>) -> String {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = text.len() - e.input.len();
            if e.input.is_empty() {
                "unexpected end of expression".to_string()
            } else {
                format!("syntax error at offset {}", offset)
            }
        }
        nom::Err::Incomplete(_) => "unexpected end of expression".to_string(),
    }
}

/// Wrap a parser so it skips leading whitespace
fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    preceded(multispace0, inner)
}

fn expr(input: &str) -> IResult<&str, Expr> {
    ws(alt((attribute, literal, binary, unary)))(input)
}

fn attribute(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            char('['),
            ws(terminated(
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
                multispace0,
            )),
            char(']'),
        ),
        |name: &str| Expr::Attribute(name.to_string()),
    )(input)
}

fn literal(input: &str) -> IResult<&str, Expr> {
    map(
        alt((int_literal, double_literal, string_literal, bool_literal)),
        Expr::Literal,
    )(input)
}

fn bracketed<'a, O>(
    keyword: &'static str,
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    preceded(
        tag(keyword),
        delimited(ws(char('[')), ws(inner), ws(char(']'))),
    )
}

fn int_literal(input: &str) -> IResult<&str, AttVal> {
    map_res(
        bracketed(
            "int",
            recognize(pair(opt(char('-')), digit1)),
        ),
        |digits: &str| digits.parse::<i64>().map(AttVal::Int),
    )(input)
}

fn double_literal(input: &str) -> IResult<&str, AttVal> {
    map(bracketed("double", double), AttVal::Double)(input)
}

fn string_literal(input: &str) -> IResult<&str, AttVal> {
    // the contents are taken verbatim, without skipping whitespace
    map(
        preceded(
            tag("string"),
            preceded(ws(char('[')), terminated(take_while(|c: char| c != ']'), char(']'))),
        ),
        |s: &str| AttVal::String(s.to_string()),
    )(input)
}

fn bool_literal(input: &str) -> IResult<&str, AttVal> {
    map(
        bracketed(
            "bool",
            alt((value(true, tag("true")), value(false, tag("false")))),
        ),
        AttVal::Bool,
    )(input)
}

fn binary_operator(input: &str) -> IResult<&str, BinaryOperator> {
    // two-character operators first so "<=" is not read as "<"
    alt((
        value(BinaryOperator::Eq, tag("==")),
        value(BinaryOperator::Neq, tag("!=")),
        value(BinaryOperator::Lte, tag("<=")),
        value(BinaryOperator::Gte, tag(">=")),
        value(BinaryOperator::And, tag("&&")),
        value(BinaryOperator::Or, tag("||")),
        value(BinaryOperator::Lt, tag("<")),
        value(BinaryOperator::Gt, tag(">")),
        value(BinaryOperator::Add, tag("+")),
        value(BinaryOperator::Sub, tag("-")),
        value(BinaryOperator::Mul, tag("*")),
        value(BinaryOperator::Div, tag("/")),
    ))(input)
}

fn binary(input: &str) -> IResult<&str, Expr> {
    let (input, op) = binary_operator(input)?;
    let (input, (left, right)) = delimited(
        ws(char('(')),
        separated_pair(expr, ws(char(',')), expr),
        ws(char(')')),
    )(input)?;
    Ok((
        input,
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    ))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(char('!'), delimited(ws(char('(')), expr, ws(char(')')))),
        |inner| Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(inner),
        },
    )(input)
}
