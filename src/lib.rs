//! relops - relational operators for a page-based database engine
//!
//! This library provides the execution layer that runs once a plan is chosen:
//! - Storage model (records, pages, tables, B+ tree index)
//! - Predicate and projection expressions compiled against live records
//! - Operators: scan and index selection, hash aggregation, sort-merge join

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod expr;
pub mod storage;

pub use config::ExecConfig;
pub use error::{Error, Result};
