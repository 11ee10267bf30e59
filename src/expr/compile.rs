//! Expression compilation
//!
//! Compiling resolves every attribute name of a parsed expression to a slot of
//! one of the bound records. The resulting [`Computation`] keeps a handle to
//! those records and reads their *current* values each time it is evaluated,
//! so an operator compiles once and then just overwrites the bound records
//! row after row.
//!
//! A computation is tied to the record buffers it was compiled against. It is
//! not reentrant across other record instances.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::ast::{BinaryOperator, Expr, UnaryOperator};
use super::parser::parse_expr;
use crate::catalog::{AttType, Schema};
use crate::error::{Error, Result};
use crate::storage::record::RecordRef;
use crate::storage::value::AttVal;

/// Compiled node: attribute references are already resolved
enum Node {
    Attribute { record: RecordRef, index: usize },
    Literal(AttVal),
    Binary {
        op: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Not(Box<Node>),
}

/// A zero-argument evaluator over live record buffers
pub struct Computation {
    text: String,
    root: Node,
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation").field("text", &self.text).finish()
    }
}

/// Compile `text` against `records`; names resolve in binding order and the
/// first record holding a name wins
pub fn compile(text: &str, records: &[RecordRef]) -> Result<Computation> {
    let expr = parse_expr(text)?;
    let root = resolve(&expr, records)?;
    Ok(Computation {
        text: text.to_string(),
        root,
    })
}

/// Compile a list of expressions against the same records
pub fn compile_all<S: AsRef<str>>(texts: &[S], records: &[RecordRef]) -> Result<Vec<Computation>> {
    texts
        .iter()
        .map(|text| compile(text.as_ref(), records))
        .collect()
}

fn resolve(expr: &Expr, records: &[RecordRef]) -> Result<Node> {
    match expr {
        Expr::Attribute(name) => records
            .iter()
            .find_map(|record| {
                let index = record.borrow().schema().index_of(name)?;
                Some(Node::Attribute {
                    record: record.clone(),
                    index,
                })
            })
            .ok_or_else(|| Error::UnknownAttribute(name.clone())),
        Expr::Literal(value) => Ok(Node::Literal(value.clone())),
        Expr::BinaryOp { op, left, right } => Ok(Node::Binary {
            op: *op,
            left: Box::new(resolve(left, records)?),
            right: Box::new(resolve(right, records)?),
        }),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => Ok(Node::Not(Box::new(resolve(expr, records)?))),
    }
}

impl Computation {
    /// Evaluate against the current contents of the bound records
    pub fn eval(&self) -> Result<AttVal> {
        eval_node(&self.root)
    }

    /// Evaluate and coerce the result to a boolean
    pub fn eval_bool(&self) -> Result<bool> {
        self.eval()?.to_bool()
    }
}

fn eval_node(node: &Node) -> Result<AttVal> {
    match node {
        Node::Attribute { record, index } => Ok(record.borrow().get_att(*index)?.clone()),
        Node::Literal(value) => Ok(value.clone()),
        Node::Not(inner) => Ok(AttVal::Bool(!eval_node(inner)?.to_bool()?)),
        Node::Binary { op, left, right } => match op {
            // short-circuit
            BinaryOperator::And => {
                if !eval_node(left)?.to_bool()? {
                    return Ok(AttVal::Bool(false));
                }
                Ok(AttVal::Bool(eval_node(right)?.to_bool()?))
            }
            BinaryOperator::Or => {
                if eval_node(left)?.to_bool()? {
                    return Ok(AttVal::Bool(true));
                }
                Ok(AttVal::Bool(eval_node(right)?.to_bool()?))
            }
            _ => {
                let l = eval_node(left)?;
                let r = eval_node(right)?;
                if op.is_comparison() {
                    evaluate_comparison(*op, &l, &r)
                } else {
                    evaluate_arithmetic(*op, &l, &r)
                }
            }
        },
    }
}

fn evaluate_comparison(op: BinaryOperator, left: &AttVal, right: &AttVal) -> Result<AttVal> {
    let cmp = left.compare(right).ok_or_else(|| Error::Incomparable {
        left: left.att_type().to_string(),
        right: right.att_type().to_string(),
    })?;
    let result = match op {
        BinaryOperator::Eq => cmp == Ordering::Equal,
        BinaryOperator::Neq => cmp != Ordering::Equal,
        BinaryOperator::Lt => cmp == Ordering::Less,
        BinaryOperator::Gt => cmp == Ordering::Greater,
        BinaryOperator::Lte => cmp != Ordering::Greater,
        BinaryOperator::Gte => cmp != Ordering::Less,
        _ => unreachable!("not a comparison operator"),
    };
    Ok(AttVal::Bool(result))
}

fn evaluate_arithmetic(op: BinaryOperator, left: &AttVal, right: &AttVal) -> Result<AttVal> {
    match (left, right) {
        (AttVal::String(a), AttVal::String(b)) if op == BinaryOperator::Add => {
            Ok(AttVal::String(format!("{}{}", a, b)))
        }
        (AttVal::String(_), _) | (_, AttVal::String(_)) => Err(Error::TypeMismatch {
            from: AttType::String.to_string(),
            to: "numeric".to_string(),
        }),
        (AttVal::Double(_), _) | (_, AttVal::Double(_)) => {
            let a = left.to_double()?;
            let b = right.to_double()?;
            let result = match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Sub => a - b,
                BinaryOperator::Mul => a * b,
                BinaryOperator::Div => {
                    if b == 0.0 {
                        return Err(Error::DivisionByZero);
                    }
                    a / b
                }
                _ => unreachable!("not an arithmetic operator"),
            };
            Ok(AttVal::Double(result))
        }
        _ => {
            let a = left.to_int()?;
            let b = right.to_int()?;
            let result = match op {
                BinaryOperator::Add => a.wrapping_add(b),
                BinaryOperator::Sub => a.wrapping_sub(b),
                BinaryOperator::Mul => a.wrapping_mul(b),
                BinaryOperator::Div => {
                    if b == 0 {
                        return Err(Error::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
                _ => unreachable!("not an arithmetic operator"),
            };
            Ok(AttVal::Int(result))
        }
    }
}

/// Two live records viewed as one, left attributes first
#[derive(Debug, Clone)]
pub struct CombinedRecord {
    left: RecordRef,
    right: RecordRef,
    schema: Arc<Schema>,
}

impl CombinedRecord {
    pub fn new(left: RecordRef, right: RecordRef) -> Self {
        let schema = Schema::concat(left.borrow().schema(), right.borrow().schema());
        Self {
            left,
            right,
            schema: Arc::new(schema),
        }
    }

    /// The concatenated schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Compile an expression that may name attributes of either side; a
    /// name present on both sides refers to the left one
    pub fn compile(&self, text: &str) -> Result<Computation> {
        compile(text, &[self.left.clone(), self.right.clone()])
    }
}

/// Orders two records by the same key expression
#[derive(Debug)]
pub struct RecordComparator {
    lhs_key: Computation,
    rhs_key: Computation,
}

impl RecordComparator {
    pub fn new(key: &str, lhs: &RecordRef, rhs: &RecordRef) -> Result<Self> {
        Ok(Self {
            lhs_key: compile(key, std::slice::from_ref(lhs))?,
            rhs_key: compile(key, std::slice::from_ref(rhs))?,
        })
    }

    fn ordering(&self) -> Result<Ordering> {
        let a = self.lhs_key.eval()?;
        let b = self.rhs_key.eval()?;
        a.compare(&b).ok_or_else(|| Error::Incomparable {
            left: a.att_type().to_string(),
            right: b.att_type().to_string(),
        })
    }

    /// True iff key(lhs) < key(rhs)
    pub fn less(&self) -> Result<bool> {
        Ok(self.ordering()? == Ordering::Less)
    }

    /// True iff neither key orders before the other
    pub fn equal(&self) -> Result<bool> {
        let forward = self.ordering()?;
        let backward = self.rhs_key.eval()?.compare(&self.lhs_key.eval()?);
        Ok(forward != Ordering::Less && backward != Some(Ordering::Less))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::Record;

    fn record(atts: &[(&str, AttType)], values: Vec<AttVal>) -> RecordRef {
        let schema = Arc::new(Schema::from_atts(atts.iter().cloned()));
        Record::from_values(schema, values).unwrap().into_ref()
    }

    #[test]
    fn test_eval_reads_current_values() {
        let rec = record(
            &[("id", AttType::Int), ("v", AttType::Int)],
            vec![AttVal::Int(1), AttVal::Int(5)],
        );
        let pred = compile("> ([v], int[5])", &[rec.clone()]).unwrap();
        assert!(!pred.eval_bool().unwrap());

        rec.borrow_mut().set_att(1, AttVal::Int(9)).unwrap();
        assert!(pred.eval_bool().unwrap());
    }

    #[test]
    fn test_arithmetic_typing() {
        let rec = record(
            &[("i", AttType::Int), ("d", AttType::Double), ("s", AttType::String)],
            vec![AttVal::Int(7), AttVal::Double(0.5), AttVal::from("ab")],
        );
        let eval = |text: &str| compile(text, &[rec.clone()]).unwrap().eval();

        assert_eq!(eval("/ ([i], int[2])").unwrap(), AttVal::Int(3));
        assert_eq!(eval("+ ([i], [d])").unwrap(), AttVal::Double(7.5));
        assert_eq!(eval("+ ([s], string[c])").unwrap(), AttVal::from("abc"));
        assert!(matches!(eval("/ ([i], int[0])"), Err(Error::DivisionByZero)));
        assert!(matches!(eval("/ ([d], double[0.0])"), Err(Error::DivisionByZero)));
        assert!(matches!(eval("- ([s], int[1])"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(eval("< ([s], int[1])"), Err(Error::Incomparable { .. })));
    }

    #[test]
    fn test_logical_short_circuit() {
        let rec = record(&[("s", AttType::String)], vec![AttVal::from("x")]);
        // the right operand would fail if it were evaluated
        let and = compile("&& (bool[false], < ([s], int[1]))", &[rec.clone()]).unwrap();
        assert!(!and.eval_bool().unwrap());
        let or = compile("|| (bool[true], < ([s], int[1]))", &[rec.clone()]).unwrap();
        assert!(or.eval_bool().unwrap());
        let not = compile("! (== ([s], string[x]))", &[rec]).unwrap();
        assert!(!not.eval_bool().unwrap());
    }

    #[test]
    fn test_unknown_attribute() {
        let rec = record(&[("a", AttType::Int)], vec![AttVal::Int(1)]);
        assert!(matches!(
            compile("== ([b], int[1])", &[rec]),
            Err(Error::UnknownAttribute(name)) if name == "b"
        ));
    }

    #[test]
    fn test_combined_record_left_wins() {
        let left = record(
            &[("k", AttType::Int), ("a", AttType::String)],
            vec![AttVal::Int(1), AttVal::from("x")],
        );
        let right = record(
            &[("k", AttType::Int), ("b", AttType::String)],
            vec![AttVal::Int(2), AttVal::from("p")],
        );
        let combined = CombinedRecord::new(left, right.clone());
        assert_eq!(combined.schema().len(), 4);

        assert_eq!(combined.compile("[k]").unwrap().eval().unwrap(), AttVal::Int(1));
        assert_eq!(
            combined.compile("+ ([a], [b])").unwrap().eval().unwrap(),
            AttVal::from("xp")
        );

        // the view follows later changes to either side
        right.borrow_mut().set_att(1, AttVal::from("q")).unwrap();
        assert_eq!(
            combined.compile("[b]").unwrap().eval().unwrap(),
            AttVal::from("q")
        );
    }

    #[test]
    fn test_record_comparator() {
        let schema = [("k", AttType::Int)];
        let a = record(&schema, vec![AttVal::Int(1)]);
        let b = record(&schema, vec![AttVal::Int(2)]);
        let cmp = RecordComparator::new("[k]", &a, &b).unwrap();

        assert!(cmp.less().unwrap());
        assert!(!cmp.equal().unwrap());

        b.borrow_mut().set_att(0, AttVal::Int(1)).unwrap();
        assert!(!cmp.less().unwrap());
        assert!(cmp.equal().unwrap());
    }
}
