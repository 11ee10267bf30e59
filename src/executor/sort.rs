//! Sorted runs
//!
//! A table is sorted by splitting its regular pages into chunks of `run_size`
//! pages. Each chunk is filtered, sorted in memory and written out to fresh
//! pages as one run. The runs are then merged with a binary heap into a single
//! ordered stream that the join consumes through [`RecordIterator`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::{compile, Computation};
use crate::storage::iterator::{PageListIterator, RecordIterator};
use crate::storage::page::PageHandle;
use crate::storage::record::{Record, RecordRef};
use crate::storage::table::Table;
use crate::storage::value::AttVal;

/// Sort key with the total order used for sorting
#[derive(Debug, Clone)]
struct OrderedKey(AttVal);

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Single-pass iterator over the merged sorted runs of a table
///
/// Keys are ordered with [`AttVal::total_cmp`], which places NaN doubles after
/// every number and orders mixed types by type rank. Consumers that compare
/// keys with [`AttVal::compare`] still see those keys as incomparable.
pub struct SortedRunsIterator {
    runs: Vec<PageListIterator>,
    // order by key, break ties with run index
    heap: BinaryHeap<Reverse<(OrderedKey, usize)>>,
    /// Run whose current row is the iterator's current row
    current: Option<usize>,
    /// Private buffer the key is evaluated over while merging
    scratch: RecordRef,
    key: Computation,
}

impl SortedRunsIterator {
    /// Build the sorted runs of `table`, keeping rows that satisfy `predicate`
    /// and ordering them by `key`
    pub fn build(table: &Table, run_size: usize, key: &str, predicate: &str) -> Result<Self> {
        let run_size = run_size.max(1);
        let scratch = table.empty_record().into_ref();
        let key = compile(key, std::slice::from_ref(&scratch))?;
        let predicate = compile(predicate, std::slice::from_ref(&scratch))?;
        let buffer = table.buffer();

        let mut runs = Vec::new();
        let mut rows_kept = 0;
        for chunk in table.regular_pages().chunks(run_size) {
            let mut rows = Vec::new();
            let mut iter = PageListIterator::new(chunk.to_vec());
            while iter.advance()? {
                iter.get_current(&mut scratch.borrow_mut())?;
                if !predicate.eval_bool()? {
                    continue;
                }
                let sort_key = OrderedKey(key.eval()?);
                let bytes = scratch.borrow_mut().to_bytes();
                rows.push((sort_key, bytes));
            }
            if rows.is_empty() {
                continue;
            }

            // stable, so equal keys keep their scan order
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            rows_kept += rows.len();

            let mut pages: Vec<PageHandle> = Vec::new();
            for (_, bytes) in &rows {
                buffer.append_spilling(&mut pages, bytes)?;
            }
            debug!(
                table = %table.name(),
                run = runs.len(),
                rows = rows.len(),
                pages = pages.len(),
                "sorted run written"
            );
            runs.push(PageListIterator::new(pages));
        }

        debug!(table = %table.name(), runs = runs.len(), rows = rows_kept, "sorted runs built");

        let mut merged = Self {
            runs,
            heap: BinaryHeap::new(),
            current: None,
            scratch,
            key,
        };
        for run_idx in 0..merged.runs.len() {
            merged.refill(run_idx)?;
        }
        Ok(merged)
    }

    /// Number of runs the input was split into
    pub fn num_runs(&self) -> usize {
        self.runs.len()
    }

    /// Advance run `run_idx` and queue its next row, if any
    fn refill(&mut self, run_idx: usize) -> Result<()> {
        let run = &mut self.runs[run_idx];
        if run.advance()? {
            run.get_current(&mut self.scratch.borrow_mut())?;
            let key = OrderedKey(self.key.eval()?);
            self.heap.push(Reverse((key, run_idx)));
        }
        Ok(())
    }
}

impl RecordIterator for SortedRunsIterator {
    fn advance(&mut self) -> Result<bool> {
        if let Some(run_idx) = self.current.take() {
            self.refill(run_idx)?;
        }
        match self.heap.pop() {
            Some(Reverse((_, run_idx))) => {
                self.current = Some(run_idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_current(&self, rec: &mut Record) -> Result<()> {
        match self.current {
            Some(run_idx) => self.runs[run_idx].get_current(rec),
            None => Err(Error::NoCurrentRecord),
        }
    }
}
