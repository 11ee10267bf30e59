//! Attribute values for relops
//!
//! This module defines how a single attribute value is represented in memory.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::catalog::AttType;
use crate::error::{Error, Result};

/// A tagged attribute value
#[derive(Debug, Clone)]
pub enum AttVal {
    /// Integer value (64-bit)
    Int(i64),
    /// Double value (64-bit)
    Double(f64),
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
}

// Doubles compare bitwise so that equal values are also equal hashes
impl PartialEq for AttVal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttVal::Int(a), AttVal::Int(b)) => a == b,
            (AttVal::Double(a), AttVal::Double(b)) => a.to_bits() == b.to_bits(),
            (AttVal::String(a), AttVal::String(b)) => a == b,
            (AttVal::Bool(a), AttVal::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttVal {}

impl Hash for AttVal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AttVal::Int(v) => v.hash(state),
            AttVal::Double(v) => v.to_bits().hash(state),
            AttVal::String(v) => v.hash(state),
            AttVal::Bool(v) => v.hash(state),
        }
    }
}

impl AttVal {
    /// Get the type of this value
    pub fn att_type(&self) -> AttType {
        match self {
            AttVal::Int(_) => AttType::Int,
            AttVal::Double(_) => AttType::Double,
            AttVal::String(_) => AttType::String,
            AttVal::Bool(_) => AttType::Bool,
        }
    }

    /// The zero value stored in a fresh record slot of the given type
    pub fn default_for(att_type: AttType) -> AttVal {
        match att_type {
            AttType::Int => AttVal::Int(0),
            AttType::Double => AttVal::Double(0.0),
            AttType::String => AttVal::String(String::new()),
            AttType::Bool => AttVal::Bool(false),
        }
    }

    fn mismatch(&self, to: AttType) -> Error {
        Error::TypeMismatch {
            from: self.att_type().to_string(),
            to: to.to_string(),
        }
    }

    /// Convert to an integer
    pub fn to_int(&self) -> Result<i64> {
        match self {
            AttVal::Int(i) => Ok(*i),
            AttVal::Double(d) => Ok(*d as i64),
            AttVal::Bool(b) => Ok(*b as i64),
            AttVal::String(_) => Err(self.mismatch(AttType::Int)),
        }
    }

    /// Convert to a double
    pub fn to_double(&self) -> Result<f64> {
        match self {
            AttVal::Int(i) => Ok(*i as f64),
            AttVal::Double(d) => Ok(*d),
            AttVal::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            AttVal::String(_) => Err(self.mismatch(AttType::Double)),
        }
    }

    /// Convert to a boolean
    pub fn to_bool(&self) -> Result<bool> {
        match self {
            AttVal::Bool(b) => Ok(*b),
            AttVal::Int(i) => Ok(*i != 0),
            _ => Err(self.mismatch(AttType::Bool)),
        }
    }

    /// Convert into a value of the given type, as done when assigning into a
    /// typed record slot
    pub fn coerce_to(&self, att_type: AttType) -> Result<AttVal> {
        if self.att_type() == att_type {
            return Ok(self.clone());
        }
        match att_type {
            AttType::Int => self.to_int().map(AttVal::Int),
            AttType::Double => self.to_double().map(AttVal::Double),
            AttType::Bool => self.to_bool().map(AttVal::Bool),
            AttType::String => Ok(AttVal::String(self.to_string())),
        }
    }

    /// Compare two values; `None` when the types cannot be compared
    pub fn compare(&self, other: &AttVal) -> Option<Ordering> {
        match (self, other) {
            (AttVal::Int(a), AttVal::Int(b)) => Some(a.cmp(b)),
            (AttVal::Double(a), AttVal::Double(b)) => a.partial_cmp(b),
            (AttVal::Int(a), AttVal::Double(b)) => (*a as f64).partial_cmp(b),
            (AttVal::Double(a), AttVal::Int(b)) => a.partial_cmp(&(*b as f64)),
            (AttVal::String(a), AttVal::String(b)) => Some(a.cmp(b)),
            (AttVal::Bool(a), AttVal::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting; incomparable types order by type rank
    pub fn total_cmp(&self, other: &AttVal) -> Ordering {
        match (self, other) {
            (AttVal::Double(a), AttVal::Double(b)) => a.total_cmp(b),
            (AttVal::Int(a), AttVal::Double(b)) => (*a as f64).total_cmp(b),
            (AttVal::Double(a), AttVal::Int(b)) => a.total_cmp(&(*b as f64)),
            _ => self
                .compare(other)
                .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank())),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            AttVal::Bool(_) => 0,
            AttVal::Int(_) | AttVal::Double(_) => 1,
            AttVal::String(_) => 2,
        }
    }

    /// Deterministic 64-bit hash of this value
    pub fn hash_value(&self) -> u64 {
        // DefaultHasher::new() uses fixed keys, so the result is stable across runs
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for AttVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttVal::Int(i) => write!(f, "{}", i),
            AttVal::Double(d) => write!(f, "{}", d),
            AttVal::String(s) => write!(f, "{}", s),
            AttVal::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for AttVal {
    fn from(v: i64) -> Self {
        AttVal::Int(v)
    }
}

impl From<i32> for AttVal {
    fn from(v: i32) -> Self {
        AttVal::Int(v as i64)
    }
}

impl From<f64> for AttVal {
    fn from(v: f64) -> Self {
        AttVal::Double(v)
    }
}

impl From<bool> for AttVal {
    fn from(v: bool) -> Self {
        AttVal::Bool(v)
    }
}

impl From<String> for AttVal {
    fn from(v: String) -> Self {
        AttVal::String(v)
    }
}

impl From<&str> for AttVal {
    fn from(v: &str) -> Self {
        AttVal::String(v.to_string())
    }
}
