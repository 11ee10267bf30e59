//! Selection operators
//!
//! Both operators filter a stream of input rows with a predicate and write one
//! projected row per match to the output table, in input order. They differ
//! only in where the rows come from: a full scan of a table, or an inclusive
//! key range of a B+ tree index.

use tracing::info;

use super::RunStats;
use crate::error::{Error, Result};
use crate::expr::{compile, compile_all, Computation};
use crate::storage::btree::BPlusTreeIndex;
use crate::storage::iterator::RecordIterator;
use crate::storage::record::{Record, RecordRef};
use crate::storage::table::Table;
use crate::storage::value::AttVal;

/// Predicate and projections compiled against one input record
struct CompiledSelection {
    input_rec: RecordRef,
    predicate: Computation,
    projections: Vec<Computation>,
}

impl CompiledSelection {
    fn new(
        input_rec: Record,
        output: &Table,
        predicate: &str,
        projections: &[String],
    ) -> Result<Self> {
        let input_rec = input_rec.into_ref();
        let bound = std::slice::from_ref(&input_rec);
        let predicate = compile(predicate, bound)?;
        let projections = compile_all(projections, bound)?;
        if projections.len() != output.schema().len() {
            return Err(Error::ProjectionArity {
                expected: output.schema().len(),
                found: projections.len(),
            });
        }
        Ok(Self {
            input_rec,
            predicate,
            projections,
        })
    }

    /// Drain `iter`, appending every matching row to `output`
    fn run(&self, iter: &mut impl RecordIterator, output: &mut Table) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let mut output_rec = output.empty_record();

        while iter.advance()? {
            iter.get_current(&mut self.input_rec.borrow_mut())?;
            stats.rows_read += 1;

            if !self.predicate.eval_bool()? {
                continue;
            }
            for (i, projection) in self.projections.iter().enumerate() {
                output_rec.set_att(i, projection.eval()?)?;
            }
            output_rec.mark_changed();
            output.append(&mut output_rec)?;
            stats.rows_written += 1;
        }
        Ok(stats)
    }
}

/// Filter-and-project over a full table scan
pub struct RegularSelection<'a> {
    input: &'a Table,
    output: &'a mut Table,
    predicate: String,
    projections: Vec<String>,
}

impl<'a> RegularSelection<'a> {
    pub fn new(
        input: &'a Table,
        output: &'a mut Table,
        predicate: impl Into<String>,
        projections: Vec<String>,
    ) -> Self {
        Self {
            input,
            output,
            predicate: predicate.into(),
            projections,
        }
    }

    /// Run the selection, appending the matching rows to the output table
    pub fn run(&mut self) -> Result<RunStats> {
        info!(
            input = %self.input.name(),
            output = %self.output.name(),
            predicate = %self.predicate,
            "regular selection started"
        );
        let compiled = CompiledSelection::new(
            self.input.empty_record(),
            self.output,
            &self.predicate,
            &self.projections,
        )?;
        let mut iter = self.input.iterator();
        let stats = compiled.run(&mut iter, self.output)?;

        info!(
            rows_read = stats.rows_read,
            rows_written = stats.rows_written,
            "regular selection finished"
        );
        Ok(stats)
    }
}

/// Filter-and-project over the key range [low, high] of an index
pub struct BPlusSelection<'a> {
    input: &'a BPlusTreeIndex,
    output: &'a mut Table,
    low: AttVal,
    high: AttVal,
    predicate: String,
    projections: Vec<String>,
}

impl<'a> BPlusSelection<'a> {
    pub fn new(
        input: &'a BPlusTreeIndex,
        output: &'a mut Table,
        low: AttVal,
        high: AttVal,
        predicate: impl Into<String>,
        projections: Vec<String>,
    ) -> Self {
        Self {
            input,
            output,
            low,
            high,
            predicate: predicate.into(),
            projections,
        }
    }

    /// Run the selection over the index range
    pub fn run(&mut self) -> Result<RunStats> {
        info!(
            input = %self.input.table().name(),
            output = %self.output.name(),
            low = %self.low,
            high = %self.high,
            "index selection started"
        );
        let compiled = CompiledSelection::new(
            self.input.empty_record(),
            self.output,
            &self.predicate,
            &self.projections,
        )?;
        let mut iter = self.input.range_iterator(&self.low, &self.high)?;
        let stats = compiled.run(&mut iter, self.output)?;

        info!(
            rows_read = stats.rows_read,
            rows_written = stats.rows_written,
            "index selection finished"
        );
        Ok(stats)
    }
}
