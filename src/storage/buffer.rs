//! Buffer manager for relops
//!
//! Issues fresh pages to tables and to operator-private structures (sorted runs,
//! join buffers) and carries the size of the shared page buffer that operators
//! plan their memory use against. Pages live in memory for as long as a handle
//! to them exists.

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use super::page::{Page, PageHandle, PageId, PageType};
use crate::config::ExecConfig;
use crate::error::{Error, Result};

/// Buffer manager
#[derive(Debug)]
pub struct BufferManager {
    /// Page geometry and buffer budget
    config: ExecConfig,
    /// Next page ID to issue
    next_page_id: Cell<PageId>,
}

impl BufferManager {
    /// Create a buffer manager from a validated config
    pub fn new(config: ExecConfig) -> Result<Rc<Self>> {
        config.validate()?;
        Ok(Rc::new(Self {
            config,
            next_page_id: Cell::new(0),
        }))
    }

    /// Create a buffer manager with `buffer_pages` pages of `page_size` bytes
    pub fn with_pages(page_size: usize, buffer_pages: usize) -> Result<Rc<Self>> {
        Self::new(
            ExecConfig::new()
                .page_size(page_size)
                .buffer_pages(buffer_pages),
        )
    }

    /// Number of pages in the shared buffer
    pub fn num_pages(&self) -> usize {
        self.config.buffer_pages
    }

    /// Size of every page in bytes
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Pages per sorted run
    pub fn run_size(&self) -> usize {
        self.config.effective_run_size()
    }

    /// Number of pages issued so far
    pub fn pages_issued(&self) -> usize {
        self.next_page_id.get() as usize
    }

    /// Issue a fresh, empty page
    pub fn new_page(&self, page_type: PageType) -> PageHandle {
        let page_id = self.next_page_id.get();
        self.next_page_id.set(page_id + 1);
        trace!(page_id, ?page_type, "new page");
        Page::new(page_id, page_type, self.config.page_size).into_handle()
    }

    /// Fail if a serialized record could never fit into a page
    pub fn check_fits(&self, size: usize) -> Result<()> {
        if size > Page::capacity(self.config.page_size) {
            return Err(Error::RecordTooLarge {
                size,
                page_size: self.config.page_size,
            });
        }
        Ok(())
    }

    /// Append serialized record bytes to the last page of a private page
    /// list, issuing a new regular page when it is full. Returns whether a
    /// new page was added.
    pub fn append_spilling(&self, pages: &mut Vec<PageHandle>, bytes: &[u8]) -> Result<bool> {
        self.check_fits(bytes.len())?;
        if let Some(page) = pages.last() {
            if page.borrow_mut().append(bytes).is_some() {
                return Ok(false);
            }
        }

        let page = self.new_page(PageType::Regular);
        page.borrow_mut()
            .append(bytes)
            .ok_or(Error::RecordTooLarge {
                size: bytes.len(),
                page_size: self.config.page_size,
            })?;
        pages.push(page);
        Ok(true)
    }
}
