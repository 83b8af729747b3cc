//! Sensor catalog: which registers hold which readings on each board.

use crate::{Error, Result, PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Width of a sensor register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RegisterWidth {
    /// Single byte.
    #[default]
    Byte,
    /// Two bytes, most significant first.
    Word,
}

impl RegisterWidth {
    /// Number of bytes occupied.
    pub fn bytes(&self) -> u8 {
        match self {
            RegisterWidth::Byte => 1,
            RegisterWidth::Word => 2,
        }
    }
}

impl TryFrom<u8> for RegisterWidth {
    type Error = Error;

    fn try_from(size: u8) -> Result<Self> {
        match size {
            1 => Ok(RegisterWidth::Byte),
            2 => Ok(RegisterWidth::Word),
            _ => Err(Error::UnsupportedSize(size)),
        }
    }
}

impl From<RegisterWidth> for u8 {
    fn from(width: RegisterWidth) -> u8 {
        width.bytes()
    }
}

/// One sensor reading located in the EC register file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Sensor name, used as the snapshot key.
    pub name: String,

    /// Register offset within the page.
    pub offset: u8,

    /// Register width.
    #[serde(default)]
    pub size: RegisterWidth,

    /// Unit suffix appended to the value.
    pub unit: String,

    /// Page that must be selected to read the register.
    #[serde(default)]
    pub page: u8,
}

impl SensorDescriptor {
    /// Creates a descriptor.
    pub fn new(name: &str, offset: u8, size: RegisterWidth, unit: &str, page: u8) -> Self {
        Self {
            name: name.to_string(),
            offset,
            size,
            unit: unit.to_string(),
            page,
        }
    }

    /// Checks that the register lies within one page.
    pub fn validate(&self) -> Result<()> {
        let last = self.offset as usize + self.size.bytes() as usize - 1;
        if last >= PAGE_SIZE {
            return Err(Error::OffsetOutOfRange {
                name: self.name.clone(),
                offset: self.offset,
                size: self.size.bytes(),
            });
        }
        Ok(())
    }
}

/// Mapping from board model to its ordered sensor list.
#[derive(Debug, Clone, Default)]
pub struct SensorCatalog {
    boards: BTreeMap<String, Vec<SensorDescriptor>>,
}

impl SensorCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the catalog of boards supported out of the box.
    pub fn builtin() -> Self {
        use RegisterWidth::{Byte, Word};

        let mut boards = BTreeMap::new();
        boards.insert(
            "ROG CROSSHAIR VIII DARK HERO".to_string(),
            vec![
                SensorDescriptor::new("MOTHERBOARD_TEMP", 0x3c, Byte, "°C", 0),
                SensorDescriptor::new("CHIPSET_TEMP", 0x3a, Byte, "°C", 0),
                SensorDescriptor::new("CPU_TEMP", 0x3b, Byte, "°C", 0),
                SensorDescriptor::new("T_SENSOR", 0x3d, Byte, "°C", 0),
                SensorDescriptor::new("WATER_FLOW", 0xbd, Byte, "RPM", 0),
                SensorDescriptor::new("WATER_IN", 0x00, Byte, "°C", 1),
                SensorDescriptor::new("WATER_OUT", 0x01, Byte, "°C", 1),
                SensorDescriptor::new("VCore", 0xa2, Word, "mV", 0),
            ],
        );
        Self { boards }
    }

    /// Creates the built-in catalog with extra board tables merged over it.
    pub fn with_boards(extra: &BTreeMap<String, Vec<SensorDescriptor>>) -> Result<Self> {
        let mut catalog = Self::builtin();
        for (board, sensors) in extra {
            catalog.insert(board, sensors.clone())?;
        }
        Ok(catalog)
    }

    /// Adds or replaces a board entry after validating its descriptors.
    pub fn insert(&mut self, board: &str, sensors: Vec<SensorDescriptor>) -> Result<()> {
        Self::validate(board, &sensors)?;
        self.boards.insert(board.to_string(), sensors);
        Ok(())
    }

    /// Returns the sensors of a board in catalog order.
    pub fn get(&self, board: &str) -> Result<&[SensorDescriptor]> {
        self.boards
            .get(board)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownBoard(board.to_string()))
    }

    /// Lists the known board models.
    pub fn boards(&self) -> impl Iterator<Item = &str> {
        self.boards.keys().map(String::as_str)
    }

    /// Checks every descriptor's range and that sensor names are unique.
    pub fn validate(board: &str, sensors: &[SensorDescriptor]) -> Result<()> {
        let mut seen = HashSet::new();
        for sensor in sensors {
            sensor.validate()?;
            if !seen.insert(sensor.name.as_str()) {
                return Err(Error::DuplicateSensor {
                    board: board.to_string(),
                    name: sensor.name.clone(),
                });
            }
        }
        Ok(())
    }
}
