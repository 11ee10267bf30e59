//! Record locations
//!
//! A location names one slot of one page. It is handed out when a record is
//! appended and stays valid for the lifetime of the page, so it can be used to
//! read a record back and to overwrite it in place.

use std::fmt;

use super::page::{PageHandle, PageId};
use super::record::Record;
use crate::error::{Error, Result};

/// A slot identifier (page_id, slot_number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub page_id: PageId,
    pub slot_num: u16,
}

impl SlotId {
    pub fn new(page_id: PageId, slot_num: u16) -> Self {
        Self { page_id, slot_num }
    }
}

/// Handle to a record's slot within a page
#[derive(Clone)]
pub struct Location {
    page: PageHandle,
    slot_num: u16,
}

impl Location {
    pub(crate) fn new(page: PageHandle, slot_num: u16) -> Self {
        Self { page, slot_num }
    }

    /// Get the page ID
    pub fn page_id(&self) -> PageId {
        self.page.borrow().page_id()
    }

    /// Get the slot number
    pub fn slot_num(&self) -> u16 {
        self.slot_num
    }

    /// Get the slot identifier
    pub fn slot_id(&self) -> SlotId {
        SlotId::new(self.page_id(), self.slot_num)
    }

    fn invalid(&self) -> Error {
        Error::InvalidSlot {
            page_id: self.page_id(),
            slot: self.slot_num,
        }
    }

    /// Deserialize the record stored here into `rec`
    pub fn read_into(&self, rec: &mut Record) -> Result<()> {
        let page = self.page.borrow();
        let bytes = page.get(self.slot_num).ok_or_else(|| self.invalid())?;
        rec.load_bytes(bytes)
    }

    /// Overwrite the record stored here with the serialized form of `rec`
    pub fn write_from(&self, rec: &mut Record) -> Result<()> {
        let bytes = rec.to_bytes();
        let written = self.page.borrow_mut().overwrite(self.slot_num, &bytes);
        if written {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("page_id", &self.page_id())
            .field("slot_num", &self.slot_num)
            .finish()
    }
}
