//! Register file access.
//!
//! The EC exposes a flat 256-byte window. Writing a page number to
//! [`PAGE_SELECT_OFFSET`](crate::PAGE_SELECT_OFFSET) swaps which page of the
//! larger address space is visible through that window.

mod debugfs;
mod memory;

pub use debugfs::EcDevice;
pub use memory::MemoryDevice;

use crate::Result;

/// Raw byte-level access to an EC register file.
pub trait RegisterDevice {
    /// Reads the whole visible register window.
    fn read_all(&mut self) -> Result<Vec<u8>>;

    /// Writes a single byte at `offset`.
    fn write_byte(&mut self, offset: u8, value: u8) -> Result<()>;
}

impl<D: RegisterDevice + ?Sized> RegisterDevice for &mut D {
    fn read_all(&mut self) -> Result<Vec<u8>> {
        (**self).read_all()
    }

    fn write_byte(&mut self, offset: u8, value: u8) -> Result<()> {
        (**self).write_byte(offset, value)
    }
}

impl<D: RegisterDevice + ?Sized> RegisterDevice for Box<D> {
    fn read_all(&mut self) -> Result<Vec<u8>> {
        (**self).read_all()
    }

    fn write_byte(&mut self, offset: u8, value: u8) -> Result<()> {
        (**self).write_byte(offset, value)
    }
}
