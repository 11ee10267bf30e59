//! Execution configuration
//!
//! Page geometry and the size of the shared page buffer used by the operators.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default page size in bytes (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages in the shared buffer
pub const DEFAULT_BUFFER_PAGES: usize = 64;

/// Smallest page that still holds a header and a useful record
pub const MIN_PAGE_SIZE: usize = 64;

/// Slot offsets are stored as u16
pub const MAX_PAGE_SIZE: usize = u16::MAX as usize;

/// Operator execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Size of every page in bytes
    pub page_size: usize,
    /// Number of pages in the shared page buffer
    pub buffer_pages: usize,
    /// Pages per sorted run; defaults to half the buffer
    pub run_size: Option<usize>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pages: DEFAULT_BUFFER_PAGES,
            run_size: None,
        }
    }
}

impl ExecConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the buffer size in pages
    pub fn buffer_pages(mut self, buffer_pages: usize) -> Self {
        self.buffer_pages = buffer_pages;
        self
    }

    /// Override the sorted-run size
    pub fn run_size(mut self, run_size: usize) -> Self {
        self.run_size = Some(run_size);
        self
    }

    /// Parse a config from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ExecConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check that the values describe a usable buffer
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::InvalidConfig(format!(
                "page_size must be between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.buffer_pages == 0 {
            return Err(Error::InvalidConfig(
                "buffer_pages must be positive".to_string(),
            ));
        }
        if self.run_size == Some(0) {
            return Err(Error::InvalidConfig("run_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Pages per sorted run: the override, or half the buffer so that one run
    /// of each join input fits at the same time
    pub fn effective_run_size(&self) -> usize {
        self.run_size.unwrap_or(self.buffer_pages / 2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_run_size() {
        let config = ExecConfig::new().buffer_pages(10);
        assert_eq!(config.effective_run_size(), 5);

        let config = ExecConfig::new().buffer_pages(1);
        assert_eq!(config.effective_run_size(), 1);

        let config = ExecConfig::new().run_size(3);
        assert_eq!(config.effective_run_size(), 3);
    }

    #[test]
    fn test_validate() {
        assert!(ExecConfig::new().validate().is_ok());
        assert!(ExecConfig::new().page_size(16).validate().is_err());
        assert!(ExecConfig::new().page_size(100_000).validate().is_err());
        assert!(ExecConfig::new().buffer_pages(0).validate().is_err());
        assert!(ExecConfig::new().run_size(0).validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "page_size": 512, "buffer_pages": 8 }}"#).unwrap();

        let config = ExecConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.page_size, 512);
        assert_eq!(config.buffer_pages, 8);
        assert_eq!(config.run_size, None);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            ExecConfig::from_json_str(r#"{ "buffer_pages": 0 }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            ExecConfig::from_json_str("not json"),
            Err(Error::ConfigParse(_))
        ));
    }
}
