//! In-memory paged register file.

use super::RegisterDevice;
use crate::{Error, Result, PAGE_SELECT_OFFSET, PAGE_SIZE};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Simulated EC register file.
///
/// Holds any number of 256-byte pages, tracks the selected page the way the
/// controller does, and records every page-select write. Unwritten pages read
/// as zeros. Failures can be injected per page to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    pages: BTreeMap<u8, [u8; PAGE_SIZE]>,
    selected: u8,
    page_writes: Vec<u8>,
    reads: usize,
    fail_all_reads: bool,
    fail_reads_on: Option<u8>,
    fail_selects_of: Option<u8>,
    read_len: Option<usize>,
}

impl MemoryDevice {
    /// Creates an all-zero register file with page 0 selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a register value, builder style.
    pub fn with_register(mut self, page: u8, offset: u8, value: u8) -> Self {
        self.set_register(page, offset, value);
        self
    }

    /// Sets a register value.
    pub fn set_register(&mut self, page: u8, offset: u8, value: u8) {
        self.pages.entry(page).or_insert([0; PAGE_SIZE])[offset as usize] = value;
    }

    /// Makes every read fail.
    pub fn failing(mut self) -> Self {
        self.fail_all_reads = true;
        self
    }

    /// Makes reads fail while `page` is selected.
    pub fn failing_on_page(mut self, page: u8) -> Self {
        self.fail_reads_on = Some(page);
        self
    }

    /// Makes page-select writes of `page` fail, leaving the selection as is.
    pub fn failing_selects_of(mut self, page: u8) -> Self {
        self.fail_selects_of = Some(page);
        self
    }

    /// Truncates every read to `len` bytes.
    pub fn truncated_to(mut self, len: usize) -> Self {
        self.read_len = Some(len);
        self
    }

    /// Currently selected page.
    pub fn selected_page(&self) -> u8 {
        self.selected
    }

    /// Every value successfully written to the page-select register, in order.
    pub fn page_writes(&self) -> &[u8] {
        &self.page_writes
    }

    /// Number of `read_all` calls, including failed ones.
    pub fn read_count(&self) -> usize {
        self.reads
    }

    fn injected(&self) -> Error {
        Error::Device {
            path: PathBuf::from("memory"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "injected failure"),
        }
    }
}

impl RegisterDevice for MemoryDevice {
    fn read_all(&mut self) -> Result<Vec<u8>> {
        self.reads += 1;
        if self.fail_all_reads || self.fail_reads_on == Some(self.selected) {
            return Err(self.injected());
        }

        let mut data = self
            .pages
            .get(&self.selected)
            .copied()
            .unwrap_or([0; PAGE_SIZE])
            .to_vec();
        data[PAGE_SELECT_OFFSET as usize] = self.selected;
        if let Some(len) = self.read_len {
            data.truncate(len);
        }
        Ok(data)
    }

    fn write_byte(&mut self, offset: u8, value: u8) -> Result<()> {
        if offset == PAGE_SELECT_OFFSET {
            if self.fail_selects_of == Some(value) {
                return Err(self.injected());
            }
            self.selected = value;
            self.page_writes.push(value);
        } else {
            self.set_register(self.selected, offset, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_select_switches_window() {
        let mut device = MemoryDevice::new()
            .with_register(0, 0x10, 7)
            .with_register(1, 0x10, 9);

        assert_eq!(device.read_all().unwrap()[0x10], 7);
        device.write_byte(PAGE_SELECT_OFFSET, 1).unwrap();
        let data = device.read_all().unwrap();
        assert_eq!(data[0x10], 9);
        assert_eq!(data[PAGE_SELECT_OFFSET as usize], 1);
        assert_eq!(device.page_writes(), &[1]);
        assert_eq!(device.read_count(), 2);
    }

    #[test]
    fn test_failure_on_page() {
        let mut device = MemoryDevice::new().failing_on_page(1);
        assert!(device.read_all().is_ok());
        device.write_byte(PAGE_SELECT_OFFSET, 1).unwrap();
        assert!(device.read_all().unwrap_err().is_device_error());
    }

    #[test]
    fn test_failed_select_keeps_page() {
        let mut device = MemoryDevice::new().failing_selects_of(1);
        assert!(device.write_byte(PAGE_SELECT_OFFSET, 1).unwrap_err().is_device_error());
        assert_eq!(device.selected_page(), 0);
        assert!(device.page_writes().is_empty());

        device.write_byte(PAGE_SELECT_OFFSET, 2).unwrap();
        assert_eq!(device.selected_page(), 2);
    }
}
