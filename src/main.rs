// src/main.rs
//! device-location - stream location snapshots from an NMEA receiver

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use device_location::{
    config::DeviceLocationConfig, location::list_serial_ports, DeviceLocationService,
    Snapshot, SnapshotEvent,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_GPSD_PORT: u16 = 2947;

#[derive(Parser)]
#[command(name = "device-location", version, about = "Watch a GNSS receiver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available serial ports
    Ports,
    /// Open a receiver and print each location snapshot
    Watch(WatchArgs),
}

#[derive(Args)]
struct WatchArgs {
    /// Serial port the receiver is attached to
    #[arg(long, value_name = "PORT", conflicts_with_all = ["gpsd", "replay"])]
    port: Option<String>,
    /// Serial baud rate
    #[arg(long, value_name = "BAUD", requires = "port")]
    baud: Option<u32>,
    /// gpsd daemon to connect to
    #[arg(long, value_name = "HOST[:PORT]", conflicts_with = "replay")]
    gpsd: Option<String>,
    /// Recorded NMEA log to replay
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
    /// Accuracy threshold in meters (0 disables it)
    #[arg(long, value_name = "METERS")]
    accuracy: Option<f64>,
    /// Print snapshots as JSON lines
    #[arg(long, action = clap::ArgAction::SetTrue)]
    json: bool,
    /// Config file to use instead of the default one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ports => print_ports(),
        Command::Watch(args) => watch(args).await,
    }
}

fn print_ports() -> anyhow::Result<()> {
    let ports = list_serial_ports()?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {} - {:?}", port.port_name, port.port_type);
        }
    }

    Ok(())
}

fn load_config(args: &WatchArgs) -> anyhow::Result<DeviceLocationConfig> {
    let mut config = match &args.config {
        Some(path) => DeviceLocationConfig::load_from(path)?,
        None => DeviceLocationConfig::load()?,
    };

    if let Some(port) = &args.port {
        config.update_serial(port.clone(), args.baud);
    } else if let Some(gpsd) = &args.gpsd {
        let (host, port) = parse_host_port(gpsd)?;
        config.update_gpsd(host, port);
    } else if let Some(path) = &args.replay {
        config.update_replay(path.clone());
    }
    if let Some(accuracy) = args.accuracy {
        config.accuracy_threshold = accuracy;
    }

    Ok(config)
}

fn parse_host_port(value: &str) -> anyhow::Result<(String, u16)> {
    match value.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid gpsd port in {:?}", value))?;
            if host.is_empty() {
                bail!("missing gpsd host in {:?}", value);
            }
            Ok((host.to_string(), port))
        }
        None => Ok((value.to_string(), DEFAULT_GPSD_PORT)),
    }
}

async fn watch(args: WatchArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let source = config.source()?;
    let service = DeviceLocationService::new(config.service_options());
    let (_subscription, mut rx) = service.subscribe_channel();

    service
        .open(source.clone(), config.properties())
        .await
        .with_context(|| format!("Failed to open {}", source.name()))?;
    info!("Watching {}; press Ctrl-C to stop", source.name());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break Ok(());
            }
            event = rx.recv() => match event {
                Some(SnapshotEvent::Snapshot(snapshot)) => {
                    if let Err(e) = print_snapshot(&snapshot, args.json) {
                        break Err(e);
                    }
                }
                Some(SnapshotEvent::ConnectionLost { reason }) => {
                    error!("Connection lost: {}", reason);
                    break Err(anyhow::anyhow!("connection to {} lost", source.name()));
                }
                None => break Ok(()),
            }
        }
    };

    service.close().await;
    outcome
}

fn print_snapshot(snapshot: &Snapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}", snapshot.summary());
    }
    Ok(())
}
