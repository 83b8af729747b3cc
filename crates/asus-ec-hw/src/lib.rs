//! ASUS EC Sensors Hardware Library
//!
//! Decodes hardware telemetry (temperatures, coolant flow, voltages) from the
//! paged register file that the Linux `ec_sys` driver exposes for ASUS
//! motherboard embedded controllers.

pub mod catalog;
pub mod device;
pub mod error;
pub mod reader;
pub mod snapshot;

pub use catalog::{RegisterWidth, SensorCatalog, SensorDescriptor};
pub use device::{EcDevice, MemoryDevice, RegisterDevice};
pub use error::{Error, Result};
pub use reader::EcReader;
pub use snapshot::Snapshot;

/// Debugfs path of the EC register file.
pub const EC_PATH: &str = "/sys/kernel/debug/ec/ec0/io";

/// Size of one register page in bytes.
pub const PAGE_SIZE: usize = 256;

/// Register offset that selects the visible page.
pub const PAGE_SELECT_OFFSET: u8 = 0xFF;

/// Page the controller shows after reset.
pub const DEFAULT_PAGE: u8 = 0;

/// Default loopback port of the sensor daemon.
pub const DEFAULT_PORT: u16 = 2787;

/// Board model used when none is configured.
pub const DEFAULT_BOARD: &str = "ROG CROSSHAIR VIII DARK HERO";
