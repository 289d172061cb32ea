// src/location/mod.rs
//! Device location sources, NMEA decoding and location snapshots

mod geometry;
mod gpsd;
pub mod nmea;
mod snapshot;
mod source;

pub use geometry::{CoordinateTransform, GeographicTransform, MapPoint, SpatialReference};
pub use nmea::{encode_sentence, NmeaDecoder};
pub use snapshot::Snapshot;
pub use source::{
    list_serial_ports, DeviceLocationSource, GpsdSource, MemoryFeed, MemorySource, Parity,
    ReplaySource, RetryPolicy, SerialPortSource, SourceConnection, StopBits,
};
