// src/map/mod.rs
//! Map-side device location tracking

mod options;
mod service;
mod viewport;

pub use options::{MapDeviceLocationOptions, NavigationMode};
pub use service::{MapDeviceLocationService, DEFAULT_ZOOM_SCALE};
pub use viewport::{MapId, MapView, MapViewport};
