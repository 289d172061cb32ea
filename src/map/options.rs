// src/map/options.rs
//! Per-map device location display options

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// The viewport is left alone
    #[default]
    Free,
    /// The viewport is recentered on every new location
    KeepAtCenter,
    /// Recentered and rotated to the direction of travel
    TrackUp,
}

/// How a map presents the device location. Held only for the map session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDeviceLocationOptions {
    pub device_location_visibility: bool,
    pub navigation_mode: NavigationMode,
    pub track_up_navigation: bool,
}

impl MapDeviceLocationOptions {
    pub fn recenters(&self) -> bool {
        self.navigation_mode != NavigationMode::Free
    }

    pub fn rotates(&self) -> bool {
        match self.navigation_mode {
            NavigationMode::Free => false,
            NavigationMode::KeepAtCenter => self.track_up_navigation,
            NavigationMode::TrackUp => true,
        }
    }
}

impl Default for MapDeviceLocationOptions {
    fn default() -> Self {
        Self {
            device_location_visibility: true,
            navigation_mode: NavigationMode::Free,
            track_up_navigation: false,
        }
    }
}
