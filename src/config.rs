// src/config.rs
//! Configuration loading

use crate::{
    error::{DeviceLocationError, Result},
    location::{
        DeviceLocationSource, GpsdSource, Parity, ReplaySource, RetryPolicy, SerialPortSource,
        SpatialReference, StopBits,
    },
    service::{DeviceLocationProperties, ServiceOptions, DEFAULT_CHANNEL_CAPACITY},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLocationConfig {
    pub source_type: String, // "serial", "gpsd", "replay"
    pub serial_port: Option<String>,
    pub serial_baudrate: u32,
    pub serial_data_bits: u8,
    pub serial_parity: Parity,
    pub serial_stop_bits: StopBits,
    pub antenna_height: f64,
    pub gpsd_host: String,
    pub gpsd_port: u16,
    pub replay_path: Option<PathBuf>,
    pub replay_interval_ms: Option<u64>,
    pub accuracy_threshold: f64,
    pub output_wkid: Option<u32>,
    pub event_capacity: usize,
    pub retry_max: u32,
    pub retry_backoff_ms: u64,
}

impl Default for DeviceLocationConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: 4800,
            serial_data_bits: 8,
            serial_parity: Parity::None,
            serial_stop_bits: StopBits::One,
            antenna_height: 0.0,
            gpsd_host: "localhost".to_string(),
            gpsd_port: 2947,
            replay_path: None,
            replay_interval_ms: None,
            accuracy_threshold: 0.0,
            output_wkid: None,
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
            retry_max: retry.max_retries,
            retry_backoff_ms: retry.backoff.as_millis() as u64,
        }
    }
}

impl DeviceLocationConfig {
    /// Load from the default location, falling back to defaults when the
    /// file does not exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DeviceLocationError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            DeviceLocationError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `$HOME/.config/device-location/config.json`
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| {
            DeviceLocationError::Config("HOME environment variable not set".to_string())
        })?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("device-location")
            .join("config.json"))
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: Option<u32>) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        if let Some(baudrate) = baudrate {
            self.serial_baudrate = baudrate;
        }
    }

    /// Update gpsd settings
    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = host;
        self.gpsd_port = port;
    }

    /// Update replay settings
    pub fn update_replay(&mut self, path: PathBuf) {
        self.source_type = "replay".to_string();
        self.replay_path = Some(path);
    }

    pub fn source(&self) -> Result<DeviceLocationSource> {
        match self.source_type.as_str() {
            "serial" => {
                let port = self.serial_port.clone().ok_or_else(|| {
                    DeviceLocationError::Config("serial source needs serial_port".to_string())
                })?;
                let mut source = SerialPortSource::new(port, self.serial_baudrate)
                    .with_antenna_height(self.antenna_height);
                source.data_bits = self.serial_data_bits;
                source.parity = self.serial_parity;
                source.stop_bits = self.serial_stop_bits;
                Ok(DeviceLocationSource::SerialPort(source))
            }
            "gpsd" => {
                let mut source = GpsdSource::new(self.gpsd_host.clone(), self.gpsd_port);
                source.antenna_height = self.antenna_height;
                Ok(DeviceLocationSource::Gpsd(source))
            }
            "replay" => {
                let path = self.replay_path.clone().ok_or_else(|| {
                    DeviceLocationError::Config("replay source needs replay_path".to_string())
                })?;
                let mut source = ReplaySource::new(path);
                source.antenna_height = self.antenna_height;
                if let Some(ms) = self.replay_interval_ms {
                    source = source.with_interval(Duration::from_millis(ms));
                }
                Ok(DeviceLocationSource::Replay(source))
            }
            other => Err(DeviceLocationError::Config(format!(
                "unknown source type: {}",
                other
            ))),
        }
    }

    pub fn properties(&self) -> DeviceLocationProperties {
        DeviceLocationProperties::new(self.accuracy_threshold)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            output_spatial_reference: self.output_wkid.map(SpatialReference::new),
            channel_capacity: self.event_capacity,
            retry: RetryPolicy {
                max_retries: self.retry_max,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            ..ServiceOptions::default()
        }
    }
}
