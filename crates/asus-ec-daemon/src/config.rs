//! Configuration management.

use anyhow::{Context, Result};
use asus_ec_hw::{SensorCatalog, SensorDescriptor, DEFAULT_BOARD, DEFAULT_PORT, EC_PATH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port on the loopback interface
    #[serde(default = "default_port")]
    pub port: u16,

    /// Sensor poll interval in milliseconds
    #[serde(default = "default_poll")]
    pub poll: u64,

    /// EC register file path
    #[serde(default = "default_device")]
    pub device: PathBuf,

    /// Board model whose catalog entry is used
    #[serde(default = "default_board")]
    pub board: String,

    /// PID file written at startup
    #[serde(default)]
    pub pidfile: Option<PathBuf>,

    /// Extra board definitions, merged over the built-in catalog
    #[serde(default)]
    pub boards: BTreeMap<String, Vec<SensorDescriptor>>,
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll() -> u64 {
    1000
}

fn default_device() -> PathBuf {
    PathBuf::from(EC_PATH)
}

fn default_board() -> String {
    DEFAULT_BOARD.to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        if config.poll == 0 {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        Ok(config)
    }

    /// Builds the sensor catalog: built-in boards plus configured ones.
    pub fn catalog(&self) -> Result<SensorCatalog> {
        SensorCatalog::with_boards(&self.boards).context("Invalid sensor table in configuration")
    }

    /// Loopback address the server binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    /// Delay between two poll passes.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            poll: default_poll(),
            device: default_device(),
            board: default_board(),
            pidfile: None,
            boards: BTreeMap::new(),
        }
    }
}
