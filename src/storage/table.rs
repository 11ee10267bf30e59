//! Table storage for relops
//!
//! A table is a schema plus an ordered, growable list of pages obtained from the
//! buffer manager. Records are appended to the last page; when it is full a new
//! regular page is requested.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use super::buffer::BufferManager;
use super::iterator::{PageListIterator, RecordIterator};
use super::location::{Location, SlotId};
use super::page::{PageHandle, PageId, PageType};
use super::record::Record;
use super::value::AttVal;
use crate::catalog::Schema;
use crate::error::{Error, Result};

/// A table combining schema and page storage
#[derive(Debug)]
pub struct Table {
    /// Table name
    name: String,
    /// Table schema
    schema: Arc<Schema>,
    /// Pages in table order
    pages: Vec<PageHandle>,
    /// Page id to position in `pages`
    page_index: HashMap<PageId, usize>,
    /// Buffer manager pages are requested from
    buffer: Rc<BufferManager>,
}

impl Table {
    /// Create a new, empty table
    pub fn new(name: impl Into<String>, schema: Schema, buffer: Rc<BufferManager>) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            pages: Vec::new(),
            page_index: HashMap::new(),
            buffer,
        }
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get table schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the buffer manager
    pub fn buffer(&self) -> &Rc<BufferManager> {
        &self.buffer
    }

    /// Number of pages of any type
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Get a page by position
    pub fn page(&self, index: usize) -> Option<PageHandle> {
        self.pages.get(index).cloned()
    }

    /// Get the page at `index` for direct writing, growing the table with
    /// fresh regular pages if it does not have that many yet
    pub fn pinned_page(&mut self, index: usize) -> PageHandle {
        while self.pages.len() <= index {
            self.push_page(PageType::Regular);
        }
        self.pages[index].clone()
    }

    /// Add a fresh page of the given type at the end of the table
    pub fn push_page(&mut self, page_type: PageType) -> PageHandle {
        let page = self.buffer.new_page(page_type);
        self.page_index
            .insert(page.borrow().page_id(), self.pages.len());
        self.pages.push(page.clone());
        debug!(table = %self.name, pages = self.pages.len(), ?page_type, "table grew");
        page
    }

    /// A record buffer laid out for this table
    pub fn empty_record(&self) -> Record {
        Record::new(self.schema.clone())
    }

    /// Append a record, acquiring a new page if the last one is full
    pub fn append(&mut self, rec: &mut Record) -> Result<Location> {
        let bytes = rec.to_bytes();
        self.buffer.check_fits(bytes.len())?;

        if let Some(page) = self.pages.last() {
            let is_regular = page.borrow().page_type() == PageType::Regular;
            if is_regular {
                if let Some(slot) = page.borrow_mut().append(&bytes) {
                    return Ok(Location::new(page.clone(), slot));
                }
            }
        }

        let page = self.push_page(PageType::Regular);
        let slot = page
            .borrow_mut()
            .append(&bytes)
            .ok_or(Error::RecordTooLarge {
                size: bytes.len(),
                page_size: self.buffer.page_size(),
            })?;
        Ok(Location::new(page, slot))
    }

    /// Append a row given as values
    pub fn insert_values(&mut self, values: Vec<AttVal>) -> Result<Location> {
        let mut rec = Record::from_values(self.schema.clone(), values)?;
        self.append(&mut rec)
    }

    /// Resolve a slot identifier into a location
    pub fn location(&self, slot_id: SlotId) -> Option<Location> {
        let index = *self.page_index.get(&slot_id.page_id)?;
        let page = self.pages[index].clone();
        let live = page.borrow().get(slot_id.slot_num).is_some();
        live.then(|| Location::new(page, slot_id.slot_num))
    }

    /// Regular pages in table order
    pub fn regular_pages(&self) -> Vec<PageHandle> {
        self.pages
            .iter()
            .filter(|p| p.borrow().page_type() == PageType::Regular)
            .cloned()
            .collect()
    }

    /// Scan over every record on the table's regular pages
    pub fn iterator(&self) -> PageListIterator {
        PageListIterator::new(self.pages.clone())
    }

    /// Decode every row in scan order
    pub fn rows(&self) -> Result<Vec<Vec<AttVal>>> {
        let mut iter = self.iterator();
        let mut rec = self.empty_record();
        let mut rows = Vec::new();
        while iter.advance()? {
            iter.get_current(&mut rec)?;
            rows.push(rec.values().to_vec());
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttType;

    fn table(page_size: usize) -> Table {
        let bpm = BufferManager::with_pages(page_size, 4).unwrap();
        let schema = Schema::from_atts([("id", AttType::Int), ("name", AttType::String)]);
        Table::new("people", schema, bpm)
    }

    #[test]
    fn test_table_append_and_scan() {
        let mut t = table(4096);
        t.insert_values(vec![1.into(), "ann".into()]).unwrap();
        t.insert_values(vec![2.into(), "bob".into()]).unwrap();

        assert_eq!(t.num_pages(), 1);
        assert_eq!(
            t.rows().unwrap(),
            vec![
                vec![AttVal::Int(1), AttVal::from("ann")],
                vec![AttVal::Int(2), AttVal::from("bob")]
            ]
        );
    }

    #[test]
    fn test_table_grows_on_overflow() {
        let mut t = table(128);
        for i in 0..20 {
            t.insert_values(vec![i.into(), "xxxxxxxx".into()]).unwrap();
        }
        assert!(t.num_pages() > 1);

        let ids: Vec<i64> = t
            .rows()
            .unwrap()
            .iter()
            .map(|r| r[0].to_int().unwrap())
            .collect();
        assert_eq!(ids, (0..20).collect::<Vec<i64>>());
    }

    #[test]
    fn test_table_location_lookup() {
        let mut t = table(4096);
        let loc = t.insert_values(vec![7.into(), "eve".into()]).unwrap();

        let found = t.location(loc.slot_id()).unwrap();
        let mut rec = t.empty_record();
        found.read_into(&mut rec).unwrap();
        assert_eq!(rec.get_att(1).unwrap(), &AttVal::from("eve"));

        assert!(t.location(SlotId::new(999, 0)).is_none());
    }

    #[test]
    fn test_append_skips_trailing_overflow_page() {
        let mut t = table(4096);
        t.insert_values(vec![1.into(), "a".into()]).unwrap();
        t.push_page(PageType::Overflow);
        t.insert_values(vec![2.into(), "b".into()]).unwrap();

        assert_eq!(t.num_pages(), 3);
        assert_eq!(t.rows().unwrap().len(), 2);
    }

    #[test]
    fn test_record_too_large() {
        let mut t = table(64);
        let long = "y".repeat(100);
        assert!(matches!(
            t.insert_values(vec![1.into(), long.into()]),
            Err(Error::RecordTooLarge { .. })
        ));
    }

    #[test]
    fn test_pinned_page_grows_table() {
        let mut t = table(4096);
        let page = t.pinned_page(2);
        assert_eq!(t.num_pages(), 3);
        assert_eq!(page.borrow().page_type(), PageType::Regular);
    }
}
