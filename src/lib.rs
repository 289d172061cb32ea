// src/lib.rs
//! Device Location Library
//!
//! Streams position fixes from an NMEA 0183 receiver (serial port, gpsd,
//! recorded log or in-process feed), publishes them as location snapshots
//! and lets maps follow the device.

pub mod config;
pub mod error;
pub mod events;
pub mod location;
pub mod map;
pub mod overlay;
pub mod service;

// Re-export main types for convenience
pub use error::{DeviceLocationError, ErrorKind, Result};
pub use events::{SnapshotEvent, SnapshotEventBus, SubscriptionHandle};
pub use location::{DeviceLocationSource, MapPoint, Snapshot, SpatialReference};
pub use map::{MapDeviceLocationOptions, MapDeviceLocationService, MapView, NavigationMode};
pub use service::{DeviceLocationProperties, DeviceLocationService, ServiceOptions, ServiceState};
