//! EC register file exposed by the `ec_sys` debugfs driver.

use super::RegisterDevice;
use crate::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Register file backed by a debugfs node such as `/sys/kernel/debug/ec/ec0/io`.
///
/// The node is reopened for every operation, matching how the kernel driver
/// expects short-lived readers and writers. Writes require the driver to be
/// loaded with `write_support=1`.
pub struct EcDevice {
    path: PathBuf,
}

impl EcDevice {
    /// Creates a device handle for the given register file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the register file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        Error::Device {
            path: self.path.clone(),
            source,
        }
    }
}

impl RegisterDevice for EcDevice {
    fn read_all(&mut self) -> Result<Vec<u8>> {
        let data = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        debug!("Read {} bytes from {}", data.len(), self.path.display());
        Ok(data)
    }

    fn write_byte(&mut self, offset: u8, value: u8) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(u64::from(offset)))
            .map_err(|e| self.io_error(e))?;
        file.write_all(&[value]).map_err(|e| self.io_error(e))?;
        debug!(
            "Wrote {:#04x} at offset {:#04x} of {}",
            value,
            offset,
            self.path.display()
        );
        Ok(())
    }
}
