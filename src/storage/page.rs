//! Page management for relops
//!
//! This module defines the slotted page that stores serialized records.
//! The slot directory grows forward from the header and record bytes grow
//! backward from the end of the page. A slot number, once issued, keeps naming
//! the same record for the lifetime of the page.

use std::cell::RefCell;
use std::rc::Rc;

/// Page header size
pub const PAGE_HEADER_SIZE: usize = 16;

/// Size of one slot directory entry (offset [2 bytes], size [2 bytes])
pub const SLOT_SIZE: usize = 4;

/// Page ID type
pub type PageId = u32;

/// A page shared between its table and any locations into it
pub type PageHandle = Rc<RefCell<Page>>;

/// Kind of a page; only regular pages hold table rows visited by scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    /// Data page holding records
    Regular,
    /// Index node page
    Index,
    /// Overflow page for oversized entries
    Overflow,
}

impl PageType {
    fn as_u8(&self) -> u8 {
        match self {
            PageType::Regular => 0,
            PageType::Index => 1,
            PageType::Overflow => 2,
        }
    }
}

/// Page header structure
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    /// Page ID
    pub page_id: PageId,
    /// Number of slots in this page
    pub tuple_count: u16,
    /// Offset to free space start
    pub free_space_offset: u16,
    /// Page type
    pub page_type: PageType,
}

impl PageHeader {
    /// Create a new page header
    pub fn new(page_id: PageId, page_type: PageType, page_size: usize) -> Self {
        Self {
            page_id,
            tuple_count: 0,
            free_space_offset: page_size as u16,
            page_type,
        }
    }

    /// Get free space available
    pub fn free_space(&self) -> usize {
        self.free_space_offset as usize - PAGE_HEADER_SIZE - (self.tuple_count as usize * SLOT_SIZE)
    }
}

/// A database page
#[derive(Debug, Clone)]
pub struct Page {
    /// Page header
    header: PageHeader,
    /// Raw page data
    data: Vec<u8>,
}

impl Page {
    /// Create a new empty page; `page_size` must fit a u16 offset
    pub fn new(page_id: PageId, page_type: PageType, page_size: usize) -> Self {
        let mut page = Self {
            header: PageHeader::new(page_id, page_type, page_size),
            data: vec![0u8; page_size],
        };
        page.write_header();
        page
    }

    /// Wrap this page into a shared handle
    pub fn into_handle(self) -> PageHandle {
        Rc::new(RefCell::new(self))
    }

    /// Write header to the data buffer
    fn write_header(&mut self) {
        self.data[0..4].copy_from_slice(&self.header.page_id.to_le_bytes());
        self.data[4..6].copy_from_slice(&self.header.tuple_count.to_le_bytes());
        self.data[6..8].copy_from_slice(&self.header.free_space_offset.to_le_bytes());
        self.data[8] = self.header.page_type.as_u8();
        self.data[9..PAGE_HEADER_SIZE].fill(0);
    }

    /// Get page ID
    pub fn page_id(&self) -> PageId {
        self.header.page_id
    }

    /// Get page type
    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    /// Get page size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get slot count
    pub fn tuple_count(&self) -> usize {
        self.header.tuple_count as usize
    }

    /// Get free space
    pub fn free_space(&self) -> usize {
        self.header.free_space()
    }

    /// Largest record an empty page of `page_size` bytes can hold
    pub fn capacity(page_size: usize) -> usize {
        page_size - PAGE_HEADER_SIZE - SLOT_SIZE
    }

    fn slot_entry(&self, slot_num: u16) -> (usize, usize) {
        let slot_offset = PAGE_HEADER_SIZE + (slot_num as usize * SLOT_SIZE);
        let offset =
            u16::from_le_bytes([self.data[slot_offset], self.data[slot_offset + 1]]) as usize;
        let size =
            u16::from_le_bytes([self.data[slot_offset + 2], self.data[slot_offset + 3]]) as usize;
        (offset, size)
    }

    fn write_slot_entry(&mut self, slot_num: u16, offset: usize, size: usize) {
        let slot_offset = PAGE_HEADER_SIZE + (slot_num as usize * SLOT_SIZE);
        self.data[slot_offset..slot_offset + 2].copy_from_slice(&(offset as u16).to_le_bytes());
        self.data[slot_offset + 2..slot_offset + 4].copy_from_slice(&(size as u16).to_le_bytes());
    }

    /// Append a record into the page.
    /// Returns the slot index, or `None` if the page is full
    pub fn append(&mut self, record: &[u8]) -> Option<u16> {
        let size = record.len();
        if size == 0 || self.free_space() < size + SLOT_SIZE {
            return None;
        }

        let slot_num = self.header.tuple_count;
        let offset = self.header.free_space_offset as usize - size;

        // Update header
        self.header.tuple_count += 1;
        self.header.free_space_offset = offset as u16;

        self.write_slot_entry(slot_num, offset, size);
        self.data[offset..offset + size].copy_from_slice(record);

        self.write_header();
        Some(slot_num)
    }

    /// Overwrite the record in a slot, keeping its slot number
    pub fn overwrite(&mut self, slot_num: u16, record: &[u8]) -> bool {
        if slot_num >= self.header.tuple_count || record.is_empty() {
            return false;
        }

        let (old_offset, old_size) = self.slot_entry(slot_num);
        let new_size = record.len();

        if new_size <= old_size {
            // The unused tail of the old extent is not reclaimed
            self.data[old_offset..old_offset + new_size].copy_from_slice(record);
            self.write_slot_entry(slot_num, old_offset, new_size);
            true
        } else if self.free_space() >= new_size {
            // Move the record to free space; the slot entry follows it
            let offset = self.header.free_space_offset as usize - new_size;
            self.header.free_space_offset = offset as u16;
            self.data[offset..offset + new_size].copy_from_slice(record);
            self.write_slot_entry(slot_num, offset, new_size);
            self.write_header();
            true
        } else {
            false
        }
    }

    /// Get a record from the page by slot index
    pub fn get(&self, slot_num: u16) -> Option<&[u8]> {
        if slot_num >= self.header.tuple_count {
            return None;
        }

        let (offset, size) = self.slot_entry(slot_num);
        if size == 0 {
            return None;
        }

        Some(&self.data[offset..offset + size])
    }

    /// Drop every record, keeping the page id and type
    pub fn clear(&mut self) {
        self.header.tuple_count = 0;
        self.header.free_space_offset = self.data.len() as u16;
        self.write_header();
    }
}
