//! Settings shared with the daemon's configuration file.

use anyhow::{Context, Result};
use asus_ec_hw::{SensorCatalog, SensorDescriptor, DEFAULT_BOARD, DEFAULT_PORT, EC_PATH};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The parts of the daemon configuration a one-shot query needs.
///
/// Keys the daemon alone uses (`poll`, `pidfile`) are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub board: Option<String>,
    pub device: Option<PathBuf>,
    #[serde(default)]
    pub boards: BTreeMap<String, Vec<SensorDescriptor>>,
}

impl FileConfig {
    /// Loads a daemon configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parses daemon configuration TOML.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }
}

/// Effective query settings: flags, then the config file, then defaults.
#[derive(Debug)]
pub struct Settings {
    pub port: u16,
    pub board: String,
    pub device: PathBuf,
    pub catalog: SensorCatalog,
}

impl Settings {
    /// Combines flag values with a loaded file and builds the catalog.
    pub fn resolve(
        file: FileConfig,
        port: Option<u16>,
        board: Option<String>,
        device: Option<PathBuf>,
    ) -> Result<Self> {
        let catalog = SensorCatalog::with_boards(&file.boards)
            .context("Invalid sensor table in configuration")?;
        Ok(Self {
            port: port.or(file.port).unwrap_or(DEFAULT_PORT),
            board: board
                .or(file.board)
                .unwrap_or_else(|| DEFAULT_BOARD.to_string()),
            device: device
                .or(file.device)
                .unwrap_or_else(|| PathBuf::from(EC_PATH)),
            catalog,
        })
    }
}
