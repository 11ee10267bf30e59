//! Error types for relops
//!
//! This module defines all error types raised by the operator layer.

use thiserror::Error;

/// The main error type for relops
#[derive(Error, Debug)]
pub enum Error {
    // ========== Compilation Errors ==========
    #[error("Compile error: {message} in expression '{expr}'")]
    Compile { expr: String, message: String },

    #[error("Compile error: unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("Compile error: expected {expected} projections for the output schema, got {found}")]
    ProjectionArity { expected: usize, found: usize },

    // ========== Evaluation Errors ==========
    #[error("Type error: cannot convert {from} to {to}")]
    TypeMismatch { from: String, to: String },

    #[error("Type error: cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },

    #[error("Execution error: division by zero")]
    DivisionByZero,

    // ========== Record Errors ==========
    #[error("Record error: attribute index {index} out of range for {len} attributes")]
    AttributeIndex { index: usize, len: usize },

    #[error("Record error: corrupted record - {0}")]
    CorruptRecord(String),

    // ========== Storage Errors ==========
    #[error("Storage error: record of {size} bytes does not fit a {page_size} byte page")]
    RecordTooLarge { size: usize, page_size: usize },

    #[error("Storage error: no live record at page {page_id} slot {slot}")]
    InvalidSlot { page_id: u32, slot: u16 },

    #[error("Iterator error: no current record")]
    NoCurrentRecord,

    // ========== Configuration Errors ==========
    #[error("Config error: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relops operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownAttribute("l_orderkey".to_string());
        assert_eq!(
            err.to_string(),
            "Compile error: unknown attribute 'l_orderkey'"
        );

        let err = Error::TypeMismatch {
            from: "STRING".to_string(),
            to: "INT".to_string(),
        };
        assert_eq!(err.to_string(), "Type error: cannot convert STRING to INT");
    }
}
