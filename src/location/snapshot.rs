// src/location/snapshot.rs
//! Immutable location snapshots produced by the decoder

use super::geometry::MapPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded position sample. Snapshots are never updated; a newer one
/// supersedes an older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub position: MapPoint,
    pub timestamp: DateTime<Utc>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub pdop: Option<f64>,
    pub fix_quality: Option<u8>,
    pub satellites: Option<u8>,
    pub speed: Option<f64>,      // m/s
    pub course: Option<f64>,     // degrees from true north
    pub accuracy: Option<f64>,   // estimated horizontal accuracy, meters
    pub antenna_height: f64,     // meters
    pub valid: bool,
    pub sentence: String,        // sentence type that produced the sample
}

impl Snapshot {
    /// The position in whatever spatial reference the decoder emitted
    pub fn position_as_map_point(&self) -> Option<MapPoint> {
        if self.position.is_empty() {
            None
        } else {
            Some(self.position)
        }
    }

    pub fn altitude(&self) -> Option<f64> {
        self.position.z
    }

    /// Age of the sample in seconds
    pub fn age_seconds(&self) -> i64 {
        Utc::now().signed_duration_since(self.timestamp).num_seconds()
    }

    /// Check if the sample is recent (within 10 seconds)
    pub fn is_recent(&self) -> bool {
        self.age_seconds() < 10
    }

    /// Get fix type description
    pub fn fix_description(&self) -> String {
        match self.fix_quality {
            Some(0) => "No fix".to_string(),
            Some(1) => "GPS".to_string(),
            Some(2) => "DGPS".to_string(),
            Some(3) => "PPS".to_string(),
            Some(4) => "RTK".to_string(),
            Some(5) => "Float RTK".to_string(),
            Some(6) => "Estimated".to_string(),
            Some(7) => "Manual".to_string(),
            Some(8) => "Simulation".to_string(),
            Some(q) => format!("Unknown ({})", q),
            None => "Unknown".to_string(),
        }
    }

    /// One-line summary used by the command line watcher
    pub fn summary(&self) -> String {
        let alt = match self.altitude() {
            Some(z) => format!("{:.1} m", z),
            None => "-".to_string(),
        };
        let hdop = match self.hdop {
            Some(h) => format!("{:.1}", h),
            None => "-".to_string(),
        };
        format!(
            "{} {:>12.6} {:>12.6} alt {} hdop {} {}{}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.position.y,
            self.position.x,
            alt,
            hdop,
            self.fix_description(),
            if self.valid { "" } else { " (invalid)" },
        )
    }
}
