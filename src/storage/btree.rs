//! B+ Tree Index for relops
//!
//! This module implements an in-memory B+ tree over one key attribute of a data
//! table. The operator layer only consumes its sorted, inclusive range scan.
//! Duplicate keys are allowed; equal keys may end up on both sides of a
//! separator, so range descent treats separators as inclusive bounds.

use std::cmp::Ordering;

use tracing::debug;

use super::iterator::RecordIterator;
use super::location::{Location, SlotId};
use super::record::Record;
use super::table::Table;
use super::value::AttVal;
use crate::error::{Error, Result};

const ORDER: usize = 4;

/// A key in the B+ tree (wraps AttVal with a total order)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey(pub AttVal);

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// B+ Tree Node
#[derive(Debug, Clone)]
enum BPlusNode {
    /// Internal node with keys and child pointers
    Internal {
        keys: Vec<IndexKey>,
        children: Vec<Box<BPlusNode>>,
    },
    /// Leaf node with keys and record pointers
    Leaf {
        keys: Vec<IndexKey>,
        values: Vec<SlotId>,
    },
}

/// B+ Tree mapping keys to record slots
#[derive(Debug, Default)]
pub struct BPlusTree {
    /// Root node
    root: Option<Box<BPlusNode>>,
    /// Number of entries
    size: usize,
}

impl BPlusTree {
    /// Create a new empty B+ tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key-value pair into the tree
    pub fn insert(&mut self, key: IndexKey, value: SlotId) {
        let mut root = match self.root.take() {
            Some(root) => root,
            None => {
                self.root = Some(Box::new(BPlusNode::Leaf {
                    keys: vec![key],
                    values: vec![value],
                }));
                self.size += 1;
                return;
            }
        };

        if let Some((new_node, mid_key)) = Self::insert_recursive(&mut root, key, value) {
            // Root split, create new root
            self.root = Some(Box::new(BPlusNode::Internal {
                keys: vec![mid_key],
                children: vec![root, new_node],
            }));
        } else {
            self.root = Some(root);
        }

        self.size += 1;
    }

    fn insert_recursive(
        node: &mut BPlusNode,
        key: IndexKey,
        value: SlotId,
    ) -> Option<(Box<BPlusNode>, IndexKey)> {
        match node {
            BPlusNode::Leaf { keys, values } => {
                // after any equal keys, so duplicates keep insertion order
                let pos = keys.partition_point(|k| k <= &key);
                keys.insert(pos, key);
                values.insert(pos, value);

                if keys.len() > ORDER {
                    let mid = keys.len() / 2;
                    let new_keys = keys.split_off(mid);
                    let new_values = values.split_off(mid);
                    let mid_key = new_keys[0].clone();

                    return Some((
                        Box::new(BPlusNode::Leaf {
                            keys: new_keys,
                            values: new_values,
                        }),
                        mid_key,
                    ));
                }
                None
            }
            BPlusNode::Internal { keys, children } => {
                let pos = keys.partition_point(|k| k <= &key);
                if let Some((new_node, mid_key)) =
                    Self::insert_recursive(&mut children[pos], key, value)
                {
                    keys.insert(pos, mid_key);
                    children.insert(pos + 1, new_node);

                    if keys.len() > ORDER {
                        let mid = keys.len() / 2;
                        let mid_key = keys[mid].clone();
                        let new_keys = keys.split_off(mid + 1);
                        keys.pop(); // Remove mid_key from left node
                        let new_children = children.split_off(mid + 1);

                        return Some((
                            Box::new(BPlusNode::Internal {
                                keys: new_keys,
                                children: new_children,
                            }),
                            mid_key,
                        ));
                    }
                }
                None
            }
        }
    }

    /// Range scan: all entries with key in [low, high], in key order
    pub fn range_scan(&self, low: &IndexKey, high: &IndexKey) -> Vec<(IndexKey, SlotId)> {
        let mut result = Vec::new();
        if low > high {
            return result;
        }
        if let Some(root) = &self.root {
            Self::range_scan_recursive(root, low, high, &mut result);
        }
        result
    }

    fn range_scan_recursive(
        node: &BPlusNode,
        low: &IndexKey,
        high: &IndexKey,
        result: &mut Vec<(IndexKey, SlotId)>,
    ) {
        match node {
            BPlusNode::Leaf { keys, values } => {
                for (key, value) in keys.iter().zip(values) {
                    if key >= low && key <= high {
                        result.push((key.clone(), *value));
                    }
                }
            }
            BPlusNode::Internal { keys, children } => {
                // child i holds keys in [keys[i-1], keys[i]]
                let start_pos = keys.partition_point(|k| k < low);
                let end_pos = keys.partition_point(|k| k <= high);

                for child in &children[start_pos..=end_pos] {
                    Self::range_scan_recursive(child, low, high, result);
                }
            }
        }
    }

    /// Number of entries in the tree
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// A data table together with a B+ tree over one of its attributes
#[derive(Debug)]
pub struct BPlusTreeIndex {
    /// Table holding the records
    table: Table,
    /// Position of the key attribute
    key_index: usize,
    /// The tree itself
    tree: BPlusTree,
}

impl BPlusTreeIndex {
    /// Index `table` on `key_att`, including the rows it already holds
    pub fn new(table: Table, key_att: &str) -> Result<Self> {
        let key_index = table
            .schema()
            .index_of(key_att)
            .ok_or_else(|| Error::UnknownAttribute(key_att.to_string()))?;

        let mut tree = BPlusTree::new();
        let mut rec = table.empty_record();
        for page in table.regular_pages() {
            let tuple_count = page.borrow().tuple_count();
            for slot in 0..tuple_count as u16 {
                let loc = Location::new(page.clone(), slot);
                if loc.read_into(&mut rec).is_err() {
                    continue;
                }
                tree.insert(IndexKey(rec.get_att(key_index)?.clone()), loc.slot_id());
            }
        }

        debug!(table = %table.name(), key = key_att, entries = tree.len(), "index built");
        Ok(Self {
            table,
            key_index,
            tree,
        })
    }

    /// Get the indexed table
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// A record buffer laid out for the indexed table
    pub fn empty_record(&self) -> Record {
        self.table.empty_record()
    }

    /// Append a record to the table and index it
    pub fn append(&mut self, rec: &mut Record) -> Result<Location> {
        let key = IndexKey(rec.get_att(self.key_index)?.clone());
        let loc = self.table.append(rec)?;
        self.tree.insert(key, loc.slot_id());
        Ok(loc)
    }

    /// Append a row given as values and index it
    pub fn insert_values(&mut self, values: Vec<AttVal>) -> Result<Location> {
        let mut rec = Record::from_values(self.table.schema().clone(), values)?;
        self.append(&mut rec)
    }

    /// Iterator over the records whose key lies in [low, high]
    pub fn range_iterator(&self, low: &AttVal, high: &AttVal) -> Result<RangeIterator> {
        let entries = self
            .tree
            .range_scan(&IndexKey(low.clone()), &IndexKey(high.clone()));
        let mut locations = Vec::with_capacity(entries.len());
        for (_, slot_id) in entries {
            let loc = self.table.location(slot_id).ok_or(Error::InvalidSlot {
                page_id: slot_id.page_id,
                slot: slot_id.slot_num,
            })?;
            locations.push(loc);
        }
        Ok(RangeIterator::new(locations))
    }
}

/// Range scan over an index, in key order
#[derive(Debug)]
pub struct RangeIterator {
    locations: Vec<Location>,
    /// Position of the next location to visit
    next: usize,
}

impl RangeIterator {
    fn new(locations: Vec<Location>) -> Self {
        Self { locations, next: 0 }
    }
}

impl RecordIterator for RangeIterator {
    fn advance(&mut self) -> Result<bool> {
        if self.next < self.locations.len() {
            self.next += 1;
            Ok(true)
        } else {
            // stay exhausted
            self.next = self.locations.len() + 1;
            Ok(false)
        }
    }

    fn get_current(&self, rec: &mut Record) -> Result<()> {
        match self.next.checked_sub(1).and_then(|i| self.locations.get(i)) {
            Some(loc) => loc.read_into(rec),
            None => Err(Error::NoCurrentRecord),
        }
    }
}
