//! Sort-merge join
//!
//! Both inputs are turned into sorted, filtered streams and walked forward
//! once. All left rows sharing a key are collected in an [`EqualKeyBuffer`];
//! every right row with that key is then joined against the whole buffer.

use std::cmp::Ordering;
use std::rc::Rc;

use tracing::{debug, info};

use super::sort::SortedRunsIterator;
use super::RunStats;
use crate::error::{Error, Result};
use crate::expr::{compile, CombinedRecord, Computation, RecordComparator};
use crate::storage::buffer::BufferManager;
use crate::storage::iterator::{PageListIterator, RecordIterator};
use crate::storage::page::{PageHandle, PageType};
use crate::storage::record::{Record, RecordRef};
use crate::storage::table::Table;

/// Pages holding the left rows of the current key group
#[derive(Debug)]
pub struct EqualKeyBuffer {
    buffer: Rc<BufferManager>,
    pages: Vec<PageHandle>,
}

impl EqualKeyBuffer {
    pub fn new(buffer: Rc<BufferManager>) -> Self {
        let first = buffer.new_page(PageType::Regular);
        Self {
            buffer,
            pages: vec![first],
        }
    }

    /// Empty the buffer, keeping only its first page
    pub fn reset(&mut self) {
        self.pages.truncate(1);
        match self.pages.first() {
            Some(page) => page.borrow_mut().clear(),
            None => self.pages.push(self.buffer.new_page(PageType::Regular)),
        }
    }

    /// Add a row, spilling to a new page when the current one is full
    pub fn append(&mut self, rec: &mut Record) -> Result<()> {
        let bytes = rec.to_bytes();
        if self.buffer.append_spilling(&mut self.pages, &bytes)? {
            debug!(pages = self.pages.len(), "equal-key buffer spilled");
        }
        Ok(())
    }

    /// Number of pages in use
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Scan over the buffered rows, in insertion order
    pub fn iter(&self) -> PageListIterator {
        PageListIterator::new(self.pages.clone())
    }
}

/// Compares the join keys of the current left and right rows
///
/// Uses [`AttVal::compare`](crate::storage::AttVal::compare), not the total
/// order the runs were sorted with, so a NaN key or a key of an incomparable
/// type fails the join with [`Error::Incomparable`] once it reaches the merge.
struct KeyOrder {
    left_key: Computation,
    right_key: Computation,
}

impl KeyOrder {
    fn cmp(&self) -> Result<Ordering> {
        let l = self.left_key.eval()?;
        let r = self.right_key.eval()?;
        l.compare(&r).ok_or_else(|| Error::Incomparable {
            left: l.att_type().to_string(),
            right: r.att_type().to_string(),
        })
    }
}

/// Equi-join of two tables by sorting and merging
pub struct SortMergeJoin<'a> {
    left: &'a Table,
    right: &'a Table,
    output: &'a mut Table,
    final_predicate: String,
    projections: Vec<String>,
    equality_check: (String, String),
    left_predicate: String,
    right_predicate: String,
    run_size: Option<usize>,
}

impl<'a> SortMergeJoin<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: &'a Table,
        right: &'a Table,
        output: &'a mut Table,
        final_predicate: impl Into<String>,
        projections: Vec<String>,
        equality_check: (String, String),
        left_predicate: impl Into<String>,
        right_predicate: impl Into<String>,
    ) -> Self {
        Self {
            left,
            right,
            output,
            final_predicate: final_predicate.into(),
            projections,
            equality_check,
            left_predicate: left_predicate.into(),
            right_predicate: right_predicate.into(),
            run_size: None,
        }
    }

    /// Override the number of pages per sorted run
    pub fn with_run_size(mut self, run_size: usize) -> Self {
        self.run_size = Some(run_size.max(1));
        self
    }

    /// Run the join, appending the joined rows to the output table
    pub fn run(&mut self) -> Result<RunStats> {
        let buffer = self.left.buffer().clone();
        let run_size = self.run_size.unwrap_or_else(|| buffer.run_size());
        let (left_key, right_key) = &self.equality_check;
        info!(
            left = %self.left.name(),
            right = %self.right.name(),
            output = %self.output.name(),
            left_key = %left_key,
            right_key = %right_key,
            run_size,
            "sort-merge join started"
        );

        let left_rec = self.left.empty_record().into_ref();
        let left_next = self.left.empty_record().into_ref();
        let right_rec = self.right.empty_record().into_ref();

        let same_left_key = RecordComparator::new(left_key, &left_rec, &left_next)?;
        let key_order = KeyOrder {
            left_key: compile(left_key, std::slice::from_ref(&left_rec))?,
            right_key: compile(right_key, std::slice::from_ref(&right_rec))?,
        };

        let combined = CombinedRecord::new(left_rec.clone(), right_rec.clone());
        let final_predicate = combined.compile(&self.final_predicate)?;
        let projections = self
            .projections
            .iter()
            .map(|p| combined.compile(p))
            .collect::<Result<Vec<Computation>>>()?;
        if projections.len() != self.output.schema().len() {
            return Err(Error::ProjectionArity {
                expected: self.output.schema().len(),
                found: projections.len(),
            });
        }

        let mut left_iter =
            SortedRunsIterator::build(self.left, run_size, left_key, &self.left_predicate)?;
        let mut right_iter =
            SortedRunsIterator::build(self.right, run_size, right_key, &self.right_predicate)?;

        let mut joiner = Joiner {
            left_rec,
            left_next,
            right_rec,
            same_left_key,
            key_order,
            final_predicate,
            projections,
            output_rec: self.output.empty_record(),
            equal_keys: EqualKeyBuffer::new(buffer),
            stats: RunStats::default(),
        };
        joiner.merge(&mut left_iter, &mut right_iter, self.output)?;

        let stats = joiner.stats;
        info!(
            rows_read = stats.rows_read,
            rows_written = stats.rows_written,
            "sort-merge join finished"
        );
        Ok(stats)
    }
}

/// State of one merge pass
struct Joiner {
    left_rec: RecordRef,
    left_next: RecordRef,
    right_rec: RecordRef,
    /// Orders `left_rec` against `left_next` by the left key
    same_left_key: RecordComparator,
    key_order: KeyOrder,
    final_predicate: Computation,
    projections: Vec<Computation>,
    output_rec: Record,
    equal_keys: EqualKeyBuffer,
    stats: RunStats,
}

impl Joiner {
    fn step(&mut self, iter: &mut impl RecordIterator) -> Result<bool> {
        let more = iter.advance()?;
        if more {
            self.stats.rows_read += 1;
        }
        Ok(more)
    }

    fn merge(
        &mut self,
        left: &mut impl RecordIterator,
        right: &mut impl RecordIterator,
        output: &mut Table,
    ) -> Result<()> {
        if !self.step(left)? || !self.step(right)? {
            return Ok(());
        }

        loop {
            left.get_current(&mut self.left_rec.borrow_mut())?;
            right.get_current(&mut self.right_rec.borrow_mut())?;

            match self.key_order.cmp()? {
                Ordering::Less => {
                    if !self.step(left)? {
                        return Ok(());
                    }
                }
                Ordering::Greater => {
                    if !self.step(right)? {
                        return Ok(());
                    }
                }
                Ordering::Equal => {
                    let left_exhausted = self.collect_left_group(left)?;
                    let right_exhausted = self.emit_matches(right, output)?;
                    if left_exhausted || right_exhausted {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Buffer the current left row and every following left row with the
    /// same key. Returns true if the left input ran out.
    fn collect_left_group(&mut self, left: &mut impl RecordIterator) -> Result<bool> {
        self.equal_keys.reset();
        self.equal_keys.append(&mut self.left_rec.borrow_mut())?;

        loop {
            if !self.step(left)? {
                return Ok(true);
            }
            left.get_current(&mut self.left_next.borrow_mut())?;
            if !self.same_left_key.equal()? {
                return Ok(false);
            }
            self.equal_keys.append(&mut self.left_next.borrow_mut())?;
        }
    }

    /// Join every right row matching the buffered key against the buffer.
    /// Returns true if the right input ran out.
    fn emit_matches(
        &mut self,
        right: &mut impl RecordIterator,
        output: &mut Table,
    ) -> Result<bool> {
        while self.key_order.cmp()? == Ordering::Equal {
            let mut buffered = self.equal_keys.iter();
            while buffered.advance()? {
                buffered.get_current(&mut self.left_rec.borrow_mut())?;
                if !self.final_predicate.eval_bool()? {
                    continue;
                }
                for (i, projection) in self.projections.iter().enumerate() {
                    self.output_rec.set_att(i, projection.eval()?)?;
                }
                self.output_rec.mark_changed();
                output.append(&mut self.output_rec)?;
                self.stats.rows_written += 1;
            }

            if !self.step(right)? {
                return Ok(true);
            }
            right.get_current(&mut self.right_rec.borrow_mut())?;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttType, Schema};
    use crate::storage::value::AttVal;

    fn keyed_table(bpm: &Rc<BufferManager>, name: &str, rows: &[(i64, &str)]) -> Table {
        let prefix = &name[..1];
        let schema = Schema::from_atts([
            (format!("{}_k", prefix), AttType::Int),
            (format!("{}_v", prefix), AttType::String),
        ]);
        let mut table = Table::new(name, schema, bpm.clone());
        for (k, v) in rows {
            table
                .insert_values(vec![AttVal::Int(*k), AttVal::from(*v)])
                .unwrap();
        }
        table
    }

    fn pair_table(bpm: &Rc<BufferManager>) -> Table {
        let schema = Schema::from_atts([("lv", AttType::String), ("rv", AttType::String)]);
        Table::new("out", schema, bpm.clone())
    }

    fn join(left: &Table, right: &Table, output: &mut Table, run_size: usize) -> RunStats {
        SortMergeJoin::new(
            left,
            right,
            output,
            "bool[true]",
            vec!["[l_v]".into(), "[r_v]".into()],
            ("[l_k]".into(), "[r_k]".into()),
            "bool[true]",
            "bool[true]",
        )
        .with_run_size(run_size)
        .run()
        .unwrap()
    }

    fn sorted_pairs(table: &Table) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = table
            .rows()
            .unwrap()
            .into_iter()
            .map(|r| (r[0].to_string(), r[1].to_string()))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_join_duplicates_on_both_sides() {
        let bpm = BufferManager::with_pages(4096, 8).unwrap();
        let left = keyed_table(&bpm, "left", &[(2, "a"), (1, "b"), (2, "c"), (3, "d")]);
        let right = keyed_table(&bpm, "right", &[(2, "x"), (4, "y"), (2, "z"), (0, "w")]);
        let mut out = pair_table(&bpm);

        let stats = join(&left, &right, &mut out, 1);
        assert_eq!(stats.rows_written, 4);
        assert_eq!(
            sorted_pairs(&out),
            vec![
                ("a".into(), "x".into()),
                ("a".into(), "z".into()),
                ("c".into(), "x".into()),
                ("c".into(), "z".into()),
            ]
        );
    }

    #[test]
    fn test_join_equal_key_buffer_spills() {
        // tiny pages so one key group spans many buffer pages
        let bpm = BufferManager::with_pages(96, 8).unwrap();
        let left_rows: Vec<(i64, String)> = (0..25).map(|i| (7, format!("l{}", i))).collect();
        let left_refs: Vec<(i64, &str)> = left_rows.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let left = keyed_table(&bpm, "left", &left_refs);
        let right = keyed_table(&bpm, "right", &[(7, "r0"), (7, "r1"), (8, "r2")]);
        let mut out = pair_table(&bpm);

        let stats = join(&left, &right, &mut out, 2);
        assert_eq!(stats.rows_written, 50);
    }

    #[test]
    fn test_join_side_predicates_and_final_predicate() {
        let bpm = BufferManager::with_pages(4096, 8).unwrap();
        let left = keyed_table(&bpm, "left", &[(1, "a"), (1, "b"), (2, "c")]);
        let right = keyed_table(&bpm, "right", &[(1, "x"), (2, "y")]);
        let mut out = pair_table(&bpm);

        SortMergeJoin::new(
            &left,
            &right,
            &mut out,
            "!= ([l_v], string[a])",
            vec!["[l_v]".into(), "[r_v]".into()],
            ("[l_k]".into(), "[r_k]".into()),
            "< ([l_k], int[2])",
            "bool[true]",
        )
        .run()
        .unwrap();

        assert_eq!(sorted_pairs(&out), vec![("b".into(), "x".into())]);
    }

    #[test]
    fn test_join_empty_side() {
        let bpm = BufferManager::with_pages(4096, 8).unwrap();
        let left = keyed_table(&bpm, "left", &[(1, "a")]);
        let right = keyed_table(&bpm, "right", &[]);
        let mut out = pair_table(&bpm);

        let stats = join(&left, &right, &mut out, 1);
        assert_eq!(stats.rows_written, 0);
        assert!(out.rows().unwrap().is_empty());
    }

    #[test]
    fn test_join_incomparable_keys() {
        let bpm = BufferManager::with_pages(4096, 8).unwrap();
        let left = keyed_table(&bpm, "left", &[(1, "a")]);
        let right = keyed_table(&bpm, "right", &[(1, "x")]);
        let mut out = pair_table(&bpm);

        let result = SortMergeJoin::new(
            &left,
            &right,
            &mut out,
            "bool[true]",
            vec!["[l_v]".into(), "[r_v]".into()],
            ("[l_k]".into(), "[r_v]".into()),
            "bool[true]",
            "bool[true]",
        )
        .run();
        assert!(matches!(result, Err(Error::Incomparable { .. })));
    }

    #[test]
    fn test_join_nan_key_is_incomparable() {
        let schema = |p: &str| {
            Schema::from_atts([
                (format!("{}_k", p), AttType::Double),
                (format!("{}_v", p), AttType::String),
            ])
        };
        let bpm = BufferManager::with_pages(4096, 8).unwrap();
        let mut left = Table::new("left", schema("l"), bpm.clone());
        left.insert_values(vec![AttVal::Double(f64::NAN), AttVal::from("n")])
            .unwrap();
        left.insert_values(vec![AttVal::Double(1.0), AttVal::from("a")])
            .unwrap();
        let mut right = Table::new("right", schema("r"), bpm.clone());
        right
            .insert_values(vec![AttVal::Double(1.0), AttVal::from("x")])
            .unwrap();
        let mut out = pair_table(&bpm);

        // NaN sorts last, so the 1.0 group is reached before the failure
        let result = SortMergeJoin::new(
            &left,
            &right,
            &mut out,
            "bool[true]",
            vec!["[l_v]".into(), "[r_v]".into()],
            ("[l_k]".into(), "[r_k]".into()),
            "bool[true]",
            "bool[true]",
        )
        .run();
        assert!(matches!(result, Err(Error::Incomparable { .. })));
    }

    #[test]
    fn test_equal_key_buffer_reset() {
        let bpm = BufferManager::with_pages(64, 8).unwrap();
        let schema = std::sync::Arc::new(Schema::from_atts([("n", AttType::Int)]));
        let mut buffer = EqualKeyBuffer::new(bpm);
        for i in 0..10 {
            let mut rec = Record::from_values(schema.clone(), vec![AttVal::Int(i)]).unwrap();
            buffer.append(&mut rec).unwrap();
        }
        assert!(buffer.num_pages() > 1);

        buffer.reset();
        assert_eq!(buffer.num_pages(), 1);
        assert!(!buffer.iter().advance().unwrap());
    }
}
