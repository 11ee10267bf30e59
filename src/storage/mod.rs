//! Storage module
//!
//! This module contains the storage components the operators run on:
//! - Attribute values and records
//! - Slotted pages and the buffer manager that issues them
//! - Tables, locations and record iterators
//! - B+ tree index

pub mod btree;
pub mod buffer;
pub mod iterator;
pub mod location;
pub mod page;
pub mod record;
pub mod table;
pub mod value;

pub use btree::{BPlusTree, BPlusTreeIndex, IndexKey, RangeIterator};
pub use buffer::BufferManager;
pub use iterator::{PageListIterator, RecordIterator};
pub use location::{Location, SlotId};
pub use page::{Page, PageHandle, PageId, PageType};
pub use record::{Record, RecordRef};
pub use table::Table;
pub use value::AttVal;
