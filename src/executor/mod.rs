//! Query execution module
//!
//! This module contains the relational operators and the sorted-run
//! machinery the join is built on.

pub mod aggregate;
pub mod join;
pub mod selection;
pub mod sort;

pub use aggregate::{AggType, Aggregate, ExactGroupKey, GroupKey, HashedGroupKey};
pub use join::{EqualKeyBuffer, SortMergeJoin};
pub use selection::{BPlusSelection, RegularSelection};
pub use sort::SortedRunsIterator;

/// Row counts of one operator run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Input rows examined
    pub rows_read: usize,
    /// Rows appended to the output table
    pub rows_written: usize,
}
