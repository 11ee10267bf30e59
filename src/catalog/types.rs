//! Attribute types for relops
//!
//! This module defines the types an attribute slot can hold.

use std::fmt;

/// Attribute Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttType {
    /// 64-bit signed integer
    Int,
    /// Double-precision floating point
    Double,
    /// Variable-length UTF-8 string
    String,
    /// Boolean (mostly produced by predicates)
    Bool,
}

impl AttType {
    /// Serialization tag for values of this type
    pub fn tag(&self) -> u8 {
        match self {
            AttType::Int => 1,
            AttType::Double => 2,
            AttType::String => 3,
            AttType::Bool => 4,
        }
    }

    /// Inverse of [`AttType::tag`]
    pub fn from_tag(tag: u8) -> Option<AttType> {
        match tag {
            1 => Some(AttType::Int),
            2 => Some(AttType::Double),
            3 => Some(AttType::String),
            4 => Some(AttType::Bool),
            _ => None,
        }
    }

    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttType::Int | AttType::Double)
    }
}

impl fmt::Display for AttType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttType::Int => write!(f, "INT"),
            AttType::Double => write!(f, "DOUBLE"),
            AttType::String => write!(f, "STRING"),
            AttType::Bool => write!(f, "BOOL"),
        }
    }
}
