//! ASUS EC Sensors
//!
//! Prints sensor readings, fetched from the daemon when it runs and read
//! straight from the embedded controller otherwise.

mod config;

use anyhow::{Context, Result};
use asus_ec_client::{ClientError, QueryClient, Source};
use asus_ec_hw::{EcDevice, EcReader, RegisterDevice, SensorCatalog, Snapshot};
use clap::Parser;
use config::{FileConfig, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asus-ec-sensors")]
#[command(about = "Show ASUS embedded controller sensor readings")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Daemon configuration file to take port, board and sensor tables from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Daemon port on 127.0.0.1 [default: 2787]
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Daemon connect and read timeout in milliseconds
    #[arg(long, default_value = "1000")]
    timeout: u64,

    /// Board model used for direct reads [default: ROG CROSSHAIR VIII DARK HERO]
    #[arg(long)]
    board: Option<String>,

    /// EC register file used for direct reads [default: /sys/kernel/debug/ec/ec0/io]
    #[arg(long)]
    device: Option<PathBuf>,

    /// Print the snapshot as JSON instead of one line per sensor
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = QueryClient::new(settings.port).with_timeout(Duration::from_millis(cli.timeout));
    let device = EcDevice::new(settings.device.clone());

    match read_sensors(&client, &settings.catalog, &settings.board, device).await {
        Ok(snapshot) => match render(&snapshot, cli.json) {
            Ok(output) => {
                print!("{}", output);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{:#}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) if is_config_error(&e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            warn!("{:#}", e);
            println!("Unable to read data.");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    Settings::resolve(file, cli.port, cli.board.clone(), cli.device.clone())
}

/// Whether a failure comes from the sensor tables rather than the device.
fn is_config_error(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<ClientError>(),
        Some(ClientError::Device(inner)) if inner.is_config_error()
    )
}

async fn read_sensors<D: RegisterDevice>(
    client: &QueryClient,
    catalog: &SensorCatalog,
    board: &str,
    device: D,
) -> Result<Snapshot> {
    let fetched = client
        .query(|| EcReader::for_board(device, catalog, board))
        .await
        .context("No daemon answered and the EC could not be read")?;
    if fetched.source == Source::Direct {
        debug!("Read {} sensors directly", fetched.snapshot.len());
    }
    Ok(fetched.snapshot)
}

fn render(snapshot: &Snapshot, json: bool) -> Result<String> {
    if json {
        let mut out = snapshot.to_json().context("Failed to encode snapshot")?;
        out.push('\n');
        return Ok(out);
    }
    Ok(snapshot
        .iter()
        .map(|(name, value)| format!("{:<20}: {}\n", name, value))
        .collect())
}
