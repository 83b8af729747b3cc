//! ASUS EC Sensors Daemon
//!
//! Polls the embedded controller once per interval and serves the latest
//! readings to local clients over a loopback TCP socket.

mod cache;
mod config;
mod pidfile;
mod server;

use anyhow::{Context, Result};
use asus_ec_hw::{EcDevice, EcReader};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cache::SensorCache;
use config::Config;
use pidfile::PidFile;

#[derive(Parser)]
#[command(name = "asus-ec-sensorsd")]
#[command(about = "Caching daemon for ASUS EC sensor readings")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port on 127.0.0.1
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Board model to read
    #[arg(long)]
    board: Option<String>,

    /// EC register file path
    #[arg(long)]
    device: Option<PathBuf>,

    /// Write the process ID to this file
    #[arg(short, long)]
    pidfile: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let config = Config::load(path).context("Failed to load configuration")?;
                info!("Loaded configuration from: {}", path.display());
                config
            }
            None => Config::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(board) = self.board {
            config.board = board;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if self.pidfile.is_some() {
            config.pidfile = self.pidfile;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let config = args.into_config()?;

    let catalog = config.catalog()?;
    let reader = EcReader::for_board(EcDevice::new(config.device.clone()), &catalog, &config.board)
        .with_context(|| format!("No usable sensor table for board '{}'", config.board))?;
    info!(
        "Reading {} sensors for {} from {}",
        reader.sensors().len(),
        config.board,
        config.device.display()
    );

    let _pidfile = config.pidfile.as_ref().map(PidFile::create).transpose()?;

    // Start refresh loop
    let cache = Arc::new(SensorCache::new());
    let refresh = tokio::spawn(cache::refresh_loop(
        reader,
        cache.clone(),
        config.poll_interval(),
    ));

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Serving sensor readings on {}", addr);

    tokio::select! {
        result = server::serve(listener, cache) => {
            result?;
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    refresh.abort();
    Ok(())
}
