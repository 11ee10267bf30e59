//! Hash aggregation
//!
//! Each group is materialized as soon as it is first seen: its aggregate
//! record is appended to the output table and its location remembered. Later
//! rows of the same group read that record back, update the running values
//! and overwrite it in place. The output table therefore holds exactly one
//! row per group when the run finishes.
//!
//! Group identity comes from a [`GroupKey`] strategy. The default,
//! [`HashedGroupKey`], combines the grouping values' hashes with XOR and never
//! compares the grouping values themselves, so two different tuples whose
//! combined hashes collide are merged into one group. [`ExactGroupKey`] keys by
//! the serialized grouping values instead.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use bytes::Bytes;
use tracing::{info, trace};

use super::RunStats;
use crate::catalog::AttType;
use crate::error::{Error, Result};
use crate::expr::{compile, compile_all, Computation};
use crate::storage::iterator::RecordIterator;
use crate::storage::location::Location;
use crate::storage::page::{PageHandle, PageType};
use crate::storage::record::{encode_values, Record};
use crate::storage::table::Table;
use crate::storage::value::AttVal;

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggType {
    Sum,
    Count,
    Avg,
}

impl fmt::Display for AggType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggType::Sum => write!(f, "sum"),
            AggType::Count => write!(f, "count"),
            AggType::Avg => write!(f, "avg"),
        }
    }
}

/// Derives a group identity from the evaluated grouping values
pub trait GroupKey {
    type Key: Eq + Hash + fmt::Debug;

    fn key(&self, values: &[AttVal]) -> Self::Key;
}

/// XOR of the grouping values' hashes
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedGroupKey;

impl GroupKey for HashedGroupKey {
    type Key = u64;

    fn key(&self, values: &[AttVal]) -> u64 {
        values.iter().fold(0, |acc, v| acc ^ v.hash_value())
    }
}

/// The grouping values themselves, in serialized form
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactGroupKey;

impl GroupKey for ExactGroupKey {
    type Key = Bytes;

    fn key(&self, values: &[AttVal]) -> Bytes {
        encode_values(values)
    }
}

/// Where a group's aggregate record lives and how many rows it has absorbed
#[derive(Debug)]
struct GroupState {
    location: Location,
    count: i64,
}

/// The output page new groups are appended to
struct WritablePage {
    index: usize,
    page: PageHandle,
}

impl WritablePage {
    /// Start at the output table's last page
    fn open(output: &mut Table) -> Self {
        let index = output.num_pages().saturating_sub(1);
        let page = output.pinned_page(index);
        Self { index, page }
    }

    fn append(&mut self, output: &mut Table, rec: &mut Record) -> Result<Location> {
        let bytes = rec.to_bytes();
        output.buffer().check_fits(bytes.len())?;
        loop {
            if self.page.borrow().page_type() == PageType::Regular {
                if let Some(slot) = self.page.borrow_mut().append(&bytes) {
                    return Ok(Location::new(self.page.clone(), slot));
                }
            }
            self.index += 1;
            self.page = output.pinned_page(self.index);
        }
    }
}

/// Hash aggregation with in-place group updates
pub struct Aggregate<'a, K: GroupKey = HashedGroupKey> {
    input: &'a Table,
    output: &'a mut Table,
    aggs: Vec<(AggType, String)>,
    groupings: Vec<String>,
    predicate: String,
    group_key: K,
}

impl<'a> Aggregate<'a> {
    pub fn new(
        input: &'a Table,
        output: &'a mut Table,
        aggs: Vec<(AggType, String)>,
        groupings: Vec<String>,
        predicate: impl Into<String>,
    ) -> Self {
        Self {
            input,
            output,
            aggs,
            groupings,
            predicate: predicate.into(),
            group_key: HashedGroupKey,
        }
    }
}

impl<'a, K: GroupKey> Aggregate<'a, K> {
    /// Replace the group identity strategy
    pub fn with_group_key<G: GroupKey>(self, group_key: G) -> Aggregate<'a, G> {
        Aggregate {
            input: self.input,
            output: self.output,
            aggs: self.aggs,
            groupings: self.groupings,
            predicate: self.predicate,
            group_key,
        }
    }

    /// Aggregate the input into the output table, one row per group
    pub fn run(&mut self) -> Result<RunStats> {
        info!(
            input = %self.input.name(),
            output = %self.output.name(),
            groupings = self.groupings.len(),
            aggregates = self.aggs.len(),
            "aggregation started"
        );

        let width = self.groupings.len() + self.aggs.len();
        let out_schema = self.output.schema().clone();
        if out_schema.len() != width {
            return Err(Error::ProjectionArity {
                expected: out_schema.len(),
                found: width,
            });
        }

        let input_rec = self.input.empty_record().into_ref();
        let bound = std::slice::from_ref(&input_rec);
        let predicate = compile(&self.predicate, bound)?;
        let grouping_fns = compile_all(&self.groupings, bound)?;
        let agg_fns = self
            .aggs
            .iter()
            .map(|(agg, text)| Ok((*agg, compile(text, bound)?)))
            .collect::<Result<Vec<(AggType, Computation)>>>()?;
        let agg_types: Vec<AttType> = out_schema.atts()[self.groupings.len()..]
            .iter()
            .map(|att| att.att_type)
            .collect();

        let mut groups: HashMap<K::Key, GroupState> = HashMap::new();
        let mut agg_rec = self.output.empty_record();
        let mut current_page = WritablePage::open(self.output);
        let mut stats = RunStats::default();

        let mut iter = self.input.iterator();
        while iter.advance()? {
            iter.get_current(&mut input_rec.borrow_mut())?;
            stats.rows_read += 1;
            if !predicate.eval_bool()? {
                continue;
            }

            let grouping_vals = grouping_fns
                .iter()
                .map(Computation::eval)
                .collect::<Result<Vec<AttVal>>>()?;
            let key = self.group_key.key(&grouping_vals);

            match groups.get_mut(&key) {
                None => {
                    for (i, value) in grouping_vals.into_iter().enumerate() {
                        agg_rec.set_att(i, value)?;
                    }
                    let offset = self.groupings.len();
                    for (j, (agg, f)) in agg_fns.iter().enumerate() {
                        let first = match agg {
                            AggType::Sum => start_sum(agg_types[j], &f.eval()?)?,
                            AggType::Count => AttVal::Int(1),
                            AggType::Avg => AttVal::Double(f.eval()?.to_double()?),
                        };
                        agg_rec.set_att(offset + j, first)?;
                    }
                    agg_rec.mark_changed();

                    let location = current_page.append(self.output, &mut agg_rec)?;
                    trace!(?key, ?location, "new group");
                    groups.insert(key, GroupState { location, count: 1 });
                    stats.rows_written += 1;
                }
                Some(group) => {
                    group.location.read_into(&mut agg_rec)?;
                    group.count += 1;
                    let count = group.count;

                    let offset = self.groupings.len();
                    for (j, (agg, f)) in agg_fns.iter().enumerate() {
                        let old = agg_rec.get_att(offset + j)?;
                        let next = match agg {
                            AggType::Sum => add_to_sum(agg_types[j], old, &f.eval()?)?,
                            AggType::Count => AttVal::Int(count),
                            AggType::Avg => {
                                let n = count as f64;
                                AttVal::Double(
                                    (old.to_double()? * (n - 1.0) + f.eval()?.to_double()?) / n,
                                )
                            }
                        };
                        agg_rec.set_att(offset + j, next)?;
                    }
                    agg_rec.mark_changed();
                    group.location.write_from(&mut agg_rec)?;
                    trace!(?key, count, "group updated");
                }
            }
        }

        info!(
            rows_read = stats.rows_read,
            groups = stats.rows_written,
            "aggregation finished"
        );
        Ok(stats)
    }
}

fn start_sum(att_type: AttType, value: &AttVal) -> Result<AttVal> {
    match att_type {
        AttType::Double => Ok(AttVal::Double(value.to_double()?)),
        _ => Ok(AttVal::Int(value.to_int()?)),
    }
}

fn add_to_sum(att_type: AttType, sum: &AttVal, value: &AttVal) -> Result<AttVal> {
    match att_type {
        AttType::Double => Ok(AttVal::Double(sum.to_double()? + value.to_double()?)),
        _ => Ok(AttVal::Int(sum.to_int()?.wrapping_add(value.to_int()?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Schema;
    use crate::storage::buffer::BufferManager;
    use std::rc::Rc;

    fn input(bpm: &Rc<BufferManager>, rows: &[(&str, i64)]) -> Table {
        let schema = Schema::from_atts([("g", AttType::String), ("x", AttType::Int)]);
        let mut table = Table::new("input", schema, bpm.clone());
        for (g, x) in rows {
            table
                .insert_values(vec![AttVal::from(*g), AttVal::Int(*x)])
                .unwrap();
        }
        table
    }

    fn output(bpm: &Rc<BufferManager>) -> Table {
        let schema = Schema::from_atts([
            ("g", AttType::String),
            ("sum_x", AttType::Int),
            ("cnt", AttType::Int),
            ("avg_x", AttType::Double),
        ]);
        Table::new("output", schema, bpm.clone())
    }

    fn aggs() -> Vec<(AggType, String)> {
        vec![
            (AggType::Sum, "[x]".to_string()),
            (AggType::Count, "int[1]".to_string()),
            (AggType::Avg, "[x]".to_string()),
        ]
    }

    #[test]
    fn test_aggregate_groups() {
        let bpm = BufferManager::with_pages(4096, 4).unwrap();
        let input = input(&bpm, &[("A", 1), ("B", 2), ("A", 3), ("A", 8)]);
        let mut out = output(&bpm);

        let stats = Aggregate::new(&input, &mut out, aggs(), vec!["[g]".into()], "bool[true]")
            .run()
            .unwrap();
        assert_eq!(stats, RunStats { rows_read: 4, rows_written: 2 });

        let mut rows = out.rows().unwrap();
        rows.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(
            rows,
            vec![
                vec![AttVal::from("A"), AttVal::Int(12), AttVal::Int(3), AttVal::Double(4.0)],
                vec![AttVal::from("B"), AttVal::Int(2), AttVal::Int(1), AttVal::Double(2.0)],
            ]
        );
    }

    #[test]
    fn test_aggregate_predicate_and_empty_input() {
        let bpm = BufferManager::with_pages(4096, 4).unwrap();
        let rows = input(&bpm, &[("A", 1), ("B", 2)]);
        let mut out = output(&bpm);
        Aggregate::new(&rows, &mut out, aggs(), vec!["[g]".into()], "> ([x], int[5])")
            .run()
            .unwrap();
        assert!(out.rows().unwrap().is_empty());

        let empty = input(&bpm, &[]);
        let mut out = output(&bpm);
        Aggregate::new(&empty, &mut out, aggs(), vec!["[g]".into()], "bool[true]")
            .run()
            .unwrap();
        assert!(out.rows().unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_schema_width_checked() {
        let bpm = BufferManager::with_pages(4096, 4).unwrap();
        let input = input(&bpm, &[("A", 1)]);
        let mut out = output(&bpm);
        let result = Aggregate::new(
            &input,
            &mut out,
            vec![(AggType::Sum, "[x]".into())],
            vec!["[g]".into()],
            "bool[true]",
        )
        .run();
        assert!(matches!(
            result,
            Err(Error::ProjectionArity { expected: 4, found: 2 })
        ));
    }

    #[test]
    fn test_aggregate_double_sum() {
        let bpm = BufferManager::with_pages(4096, 4).unwrap();
        let input = input(&bpm, &[("A", 1), ("A", 2)]);
        let schema = Schema::from_atts([("g", AttType::String), ("s", AttType::Double)]);
        let mut out = Table::new("output", schema, bpm.clone());
        Aggregate::new(
            &input,
            &mut out,
            vec![(AggType::Sum, "* ([x], double[1.5])".into())],
            vec!["[g]".into()],
            "bool[true]",
        )
        .run()
        .unwrap();
        assert_eq!(
            out.rows().unwrap(),
            vec![vec![AttVal::from("A"), AttVal::Double(4.5)]]
        );
    }

    #[test]
    fn test_aggregate_groups_spill_output_pages() {
        // 64-byte pages hold two group records each
        let bpm = BufferManager::with_pages(64, 4).unwrap();
        let rows: Vec<(String, i64)> = (0..30).map(|i| (format!("g{}", i % 5), i)).collect();
        let refs: Vec<(&str, i64)> = rows.iter().map(|(g, x)| (g.as_str(), *x)).collect();
        let input = input(&bpm, &refs);
        let schema = Schema::from_atts([("g", AttType::String), ("n", AttType::Int)]);
        let mut out = Table::new("output", schema, bpm.clone());

        Aggregate::new(
            &input,
            &mut out,
            vec![(AggType::Count, "int[1]".into())],
            vec!["[g]".into()],
            "bool[true]",
        )
        .run()
        .unwrap();

        assert!(out.num_pages() > 1);
        let result = out.rows().unwrap();
        assert_eq!(result.len(), 5);
        assert!(result.iter().all(|r| r[1] == AttVal::Int(6)));
    }

    #[test]
    fn test_aggregate_appends_after_existing_rows() {
        let bpm = BufferManager::with_pages(4096, 4).unwrap();
        let input = input(&bpm, &[("A", 1), ("A", 3)]);
        let mut out = output(&bpm);
        out.insert_values(vec![
            AttVal::from("old"),
            AttVal::Int(0),
            AttVal::Int(0),
            AttVal::Double(0.0),
        ])
        .unwrap();

        Aggregate::new(&input, &mut out, aggs(), vec!["[g]".into()], "bool[true]")
            .run()
            .unwrap();

        // the group shares the existing last page
        assert_eq!(out.num_pages(), 1);
        assert_eq!(
            out.rows().unwrap(),
            vec![
                vec![AttVal::from("old"), AttVal::Int(0), AttVal::Int(0), AttVal::Double(0.0)],
                vec![AttVal::from("A"), AttVal::Int(4), AttVal::Int(2), AttVal::Double(2.0)],
            ]
        );
    }

    #[test]
    fn test_aggregate_skips_non_regular_last_page() {
        let bpm = BufferManager::with_pages(4096, 4).unwrap();
        let input = input(&bpm, &[("A", 1), ("B", 2), ("A", 5)]);
        let mut out = output(&bpm);
        out.push_page(PageType::Overflow);

        Aggregate::new(&input, &mut out, aggs(), vec!["[g]".into()], "bool[true]")
            .run()
            .unwrap();

        assert_eq!(out.num_pages(), 2);
        let overflow = out.page(0).unwrap();
        assert_eq!(overflow.borrow().page_type(), PageType::Overflow);
        assert_eq!(overflow.borrow().tuple_count(), 0);
        let regular = out.page(1).unwrap();
        assert_eq!(regular.borrow().page_type(), PageType::Regular);
        // one slot per group: the second A row updated its record in place
        assert_eq!(regular.borrow().tuple_count(), 2);

        let mut rows = out.rows().unwrap();
        rows.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(
            rows,
            vec![
                vec![AttVal::from("A"), AttVal::Int(6), AttVal::Int(2), AttVal::Double(3.0)],
                vec![AttVal::from("B"), AttVal::Int(2), AttVal::Int(1), AttVal::Double(2.0)],
            ]
        );
    }

    #[test]
    fn test_exact_key_differs_from_hashed_key() {
        let a = [AttVal::Int(1), AttVal::Int(2)];
        let b = [AttVal::Int(2), AttVal::Int(1)];
        assert_eq!(HashedGroupKey.key(&a), HashedGroupKey.key(&b));
        assert_ne!(ExactGroupKey.key(&a), ExactGroupKey.key(&b));
    }
}
