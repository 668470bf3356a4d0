//! Thin command-line surface over the bluebridge adapter.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bluebridge_core::{BtleplugBackend, CentralManager, DeviceId, ManagerConfig};

#[derive(Parser)]
#[command(name = "bluebridge")]
#[command(author, version, about = "Awaitable front end for the platform BLE stack", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby devices and print them as they are discovered
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Connect to a device
    Connect {
        /// Device identifier (MAC address or platform UUID)
        device: String,

        /// Scan this long for the device first, in seconds
        #[arg(short, long, default_value = "5")]
        scan: u64,
    },

    /// Disconnect from a connected device
    Disconnect {
        /// Device identifier (MAC address or platform UUID)
        device: String,

        /// Scan this long for the device first, in seconds
        #[arg(short, long, default_value = "5")]
        scan: u64,
    },

    /// Enumerate services on a device (connects first)
    Discover {
        /// Device identifier (MAC address or platform UUID)
        device: String,

        /// Scan this long for the device first, in seconds
        #[arg(short, long, default_value = "5")]
        scan: u64,
    },

    /// Watch adapter state changes
    State {
        /// How long to watch, in seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (backend, events) = BtleplugBackend::new().await?;
    let manager = CentralManager::new(backend, events, ManagerConfig::default());

    let result = match cli.command {
        Commands::Scan { timeout } => cmd_scan(&manager, timeout).await,
        Commands::Connect { device, scan } => cmd_connect(&manager, &device, scan).await,
        Commands::Disconnect { device, scan } => cmd_disconnect(&manager, &device, scan).await,
        Commands::Discover { device, scan } => cmd_discover(&manager, &device, scan).await,
        Commands::State { timeout } => cmd_state(&manager, timeout).await,
    };

    manager.shutdown();
    result
}

/// Scan and print newly discovered devices as snapshots arrive.
async fn cmd_scan(manager: &CentralManager, timeout: u64) -> Result<()> {
    let mut snapshots = manager.devices_stream();
    manager.start_scan().await?;
    println!("scanning for {timeout}s...");

    let deadline = tokio::time::sleep(Duration::from_secs(timeout));
    tokio::pin!(deadline);
    let mut printed = 0;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            snapshot = snapshots.recv() => match snapshot {
                Ok(devices) => {
                    // Snapshots are append-only, so everything past the
                    // last printed index is new.
                    for record in devices.iter().skip(printed) {
                        println!("{}  {}", record.id, record.display_name());
                    }
                    printed = devices.len().max(printed);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("dropped {skipped} device snapshots");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    manager.stop_scan().await?;
    println!("{} device(s) found", manager.devices().await.len());
    Ok(())
}

/// Scan until the identifier is known to the backend, then stop.
async fn scan_for(manager: &CentralManager, device: &str, scan: u64) -> Result<DeviceId> {
    let id = DeviceId::new(device);
    manager.start_scan().await?;
    tokio::time::sleep(Duration::from_secs(scan)).await;
    manager.stop_scan().await?;
    Ok(id)
}

async fn cmd_connect(manager: &CentralManager, device: &str, scan: u64) -> Result<()> {
    let id = scan_for(manager, device, scan).await?;
    let record = manager.connect(&id).await?;
    println!("connected: {} ({})", record.display_name(), record.id);
    Ok(())
}

async fn cmd_disconnect(manager: &CentralManager, device: &str, scan: u64) -> Result<()> {
    let id = scan_for(manager, device, scan).await?;
    let record = manager.disconnect(&id).await?;
    println!("disconnected: {} ({})", record.display_name(), record.id);
    Ok(())
}

async fn cmd_discover(manager: &CentralManager, device: &str, scan: u64) -> Result<()> {
    let id = scan_for(manager, device, scan).await?;
    let record = manager.connect(&id).await?;
    println!("connected: {}", record.display_name());
    manager.discover_services(&id).await?;
    println!("services discovered");
    manager.disconnect(&id).await?;
    Ok(())
}

async fn cmd_state(manager: &CentralManager, timeout: u64) -> Result<()> {
    let mut states = manager.state_stream();
    println!("watching adapter state for {timeout}s...");

    let deadline = tokio::time::sleep(Duration::from_secs(timeout));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            state = states.recv() => match state {
                Ok(state) => println!("adapter: {state}"),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("dropped {skipped} state updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    println!("last known state: {}", manager.adapter_state());
    Ok(())
}
