//! Error types for the EC register library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when reading sensors from the embedded controller.
#[derive(Error, Debug)]
pub enum Error {
    /// The register file could not be read or written.
    #[error("EC register file I/O error at {}: {source}", path.display())]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The register file returned fewer bytes than one full page.
    #[error("Truncated register read: expected {expected} bytes, got {actual}")]
    TruncatedRead { expected: usize, actual: usize },

    /// Descriptor declares a register size other than 1 or 2 bytes.
    #[error("Unsupported register size: {0} (must be 1 or 2)")]
    UnsupportedSize(u8),

    /// Descriptor reaches past the end of the page.
    #[error("Sensor {name} at offset {offset:#04x} with size {size} exceeds the register page")]
    OffsetOutOfRange { name: String, offset: u8, size: u8 },

    /// Two descriptors on the same board share a name.
    #[error("Duplicate sensor name on board {board}: {name}")]
    DuplicateSensor { board: String, name: String },

    /// Board model has no catalog entry.
    #[error("Unknown board model: {0}")]
    UnknownBoard(String),
}

impl Error {
    /// Returns true for runtime failures of the register file itself.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Error::Device { .. } | Error::TruncatedRead { .. })
    }

    /// Returns true for catalog or descriptor defects.
    pub fn is_config_error(&self) -> bool {
        !self.is_device_error()
    }
}
