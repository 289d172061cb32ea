// src/location/gpsd.rs
//! gpsd client: raw NMEA passthrough from a gpsd daemon

use crate::error::{DeviceLocationError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// The WATCH command asking gpsd to relay raw NMEA sentences
pub fn watch_command() -> String {
    let watch = serde_json::json!({ "enable": true, "nmea": true });
    format!("?WATCH={}\n", watch)
}

/// Connect to a gpsd daemon and return a line reader over the NMEA feed
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect((host, port)).await.map_err(|e| {
        DeviceLocationError::Connection(format!(
            "Failed to connect to gpsd at {}:{}: {}",
            host, port, e
        ))
    })?;

    stream
        .write_all(watch_command().as_bytes())
        .await
        .map_err(|e| DeviceLocationError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// gpsd interleaves its own JSON reports with the relayed sentences.
/// Returns true when `line` was one of those reports.
pub fn handle_control_message(line: &str) -> bool {
    if !line.trim_start().starts_with('{') {
        return false;
    }

    match serde_json::from_str::<GpsdMessage>(line) {
        Ok(msg) => match msg.class.as_str() {
            "VERSION" => log_version(&msg.data),
            "DEVICES" => log_devices(&msg.data),
            other => debug!("Ignoring gpsd {} report", other),
        },
        Err(e) => debug!("Ignoring unparseable gpsd report: {}", e),
    }
    true
}

fn log_version(msg_data: &HashMap<String, serde_json::Value>) {
    if let Some(version) = msg_data.get("release").and_then(|v| v.as_str()) {
        info!("Connected to gpsd version {}", version);
    }
}

fn log_devices(msg_data: &HashMap<String, serde_json::Value>) {
    if let Some(devices) = msg_data.get("devices").and_then(|v| v.as_array()) {
        let paths: Vec<&str> = devices
            .iter()
            .filter_map(|d| d.get("path").and_then(|v| v.as_str()))
            .collect();
        info!("gpsd managing {} device(s): {:?}", devices.len(), paths);
    }
}
