//! Record iteration
//!
//! Iterators never hand out rows by value. `advance` moves to the next row and
//! `get_current` copies that row's bytes into a caller-owned record, so one
//! record buffer can be reused for a whole scan.

use super::page::{PageHandle, PageType};
use super::record::Record;
use crate::error::{Error, Result};

/// A single-pass cursor over stored records
pub trait RecordIterator {
    /// Move to the next record; false once the iterator is exhausted for good
    fn advance(&mut self) -> Result<bool>;

    /// Deserialize the current record into `rec`
    fn get_current(&self, rec: &mut Record) -> Result<()>;
}

/// Scan over a list of pages, visiting only regular pages
#[derive(Debug)]
pub struct PageListIterator {
    pages: Vec<PageHandle>,
    /// Page being scanned
    page_idx: usize,
    /// Next slot to look at in that page
    next_slot: u16,
    /// (page index, slot) of the current record
    current: Option<(usize, u16)>,
}

impl PageListIterator {
    /// Create an iterator over `pages`, in order
    pub fn new(pages: Vec<PageHandle>) -> Self {
        Self {
            pages,
            page_idx: 0,
            next_slot: 0,
            current: None,
        }
    }
}

impl RecordIterator for PageListIterator {
    fn advance(&mut self) -> Result<bool> {
        while self.page_idx < self.pages.len() {
            let page = self.pages[self.page_idx].borrow();
            if page.page_type() == PageType::Regular {
                while (self.next_slot as usize) < page.tuple_count() {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    if page.get(slot).is_some() {
                        self.current = Some((self.page_idx, slot));
                        return Ok(true);
                    }
                }
            }
            drop(page);
            self.page_idx += 1;
            self.next_slot = 0;
        }
        self.current = None;
        Ok(false)
    }

    fn get_current(&self, rec: &mut Record) -> Result<()> {
        let (page_idx, slot) = self.current.ok_or(Error::NoCurrentRecord)?;
        let page = self.pages[page_idx].borrow();
        let bytes = page.get(slot).ok_or(Error::InvalidSlot {
            page_id: page.page_id(),
            slot,
        })?;
        rec.load_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttType, Schema};
    use crate::storage::page::Page;
    use crate::storage::value::AttVal;
    use std::sync::Arc;

    fn page_with(page_id: u32, page_type: PageType, values: &[i64]) -> PageHandle {
        let schema = Arc::new(Schema::from_atts([("n", AttType::Int)]));
        let page = Page::new(page_id, page_type, 256).into_handle();
        for v in values {
            let mut rec = Record::from_values(schema.clone(), vec![AttVal::Int(*v)]).unwrap();
            page.borrow_mut().append(&rec.to_bytes()).unwrap();
        }
        page
    }

    fn drain(iter: &mut impl RecordIterator) -> Vec<i64> {
        let schema = Arc::new(Schema::from_atts([("n", AttType::Int)]));
        let mut rec = Record::new(schema);
        let mut out = Vec::new();
        while iter.advance().unwrap() {
            iter.get_current(&mut rec).unwrap();
            out.push(rec.get_att(0).unwrap().to_int().unwrap());
        }
        out
    }

    #[test]
    fn test_scan_in_page_order() {
        let mut iter = PageListIterator::new(vec![
            page_with(0, PageType::Regular, &[1, 2]),
            page_with(1, PageType::Regular, &[]),
            page_with(2, PageType::Regular, &[3]),
        ]);
        assert_eq!(drain(&mut iter), vec![1, 2, 3]);
        // exhaustion is permanent
        assert!(!iter.advance().unwrap());
    }

    #[test]
    fn test_scan_skips_non_regular_pages() {
        let mut iter = PageListIterator::new(vec![
            page_with(0, PageType::Regular, &[1]),
            page_with(1, PageType::Overflow, &[99]),
            page_with(2, PageType::Index, &[98]),
            page_with(3, PageType::Regular, &[2]),
        ]);
        assert_eq!(drain(&mut iter), vec![1, 2]);
    }

    #[test]
    fn test_get_current_before_advance() {
        let iter = PageListIterator::new(vec![page_with(0, PageType::Regular, &[1])]);
        let schema = Arc::new(Schema::from_atts([("n", AttType::Int)]));
        let mut rec = Record::new(schema);
        assert!(matches!(
            iter.get_current(&mut rec),
            Err(Error::NoCurrentRecord)
        ));
    }
}
