// src/map/service.rs
//! Binds maps to the device location feed

use super::{
    options::MapDeviceLocationOptions,
    viewport::{MapId, MapView},
};
use crate::{
    error::{DeviceLocationError, Result},
    events::{SnapshotEvent, SnapshotEventBus, SubscriptionHandle},
    location::{CoordinateTransform, Snapshot},
    service::DeviceLocationService,
};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Scale used by `zoom_or_pan_to_current_location` when zooming (1:5000)
pub const DEFAULT_ZOOM_SCALE: f64 = 5000.0;

#[derive(Default)]
struct MapBinding {
    enabled: bool,
    options: MapDeviceLocationOptions,
    follower: Option<Follower>,
}

struct Follower {
    subscription: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl Follower {
    fn stop(self, bus: &SnapshotEventBus) {
        bus.unsubscribe(self.subscription);
        self.task.abort();
    }
}

type Bindings = Arc<RwLock<HashMap<MapId, MapBinding>>>;

/// Per-map device location tracking: enablement, display options,
/// navigation and zoom/pan to the current location.
pub struct MapDeviceLocationService {
    device: Arc<DeviceLocationService>,
    maps: Bindings,
    zoom_scale: f64,
}

impl MapDeviceLocationService {
    pub fn new(device: Arc<DeviceLocationService>) -> Self {
        Self {
            device,
            maps: Arc::new(RwLock::new(HashMap::new())),
            zoom_scale: DEFAULT_ZOOM_SCALE,
        }
    }

    pub fn with_zoom_scale(mut self, scale: f64) -> Self {
        self.zoom_scale = scale;
        self
    }

    pub fn device(&self) -> &Arc<DeviceLocationService> {
        &self.device
    }

    /// Turn tracking on or off for `map`. Works with or without an open
    /// source; tracking starts with the first snapshot either way.
    ///
    /// Enabling runs a follower task and fails with `InvalidState` outside
    /// a Tokio runtime, leaving the map untracked. Disabling works anywhere.
    pub fn set_device_location_enabled(&self, map: &MapView, enabled: bool) -> Result<()> {
        let mut maps = write(&self.maps);
        let binding = maps.entry(map.id().clone()).or_default();
        if binding.enabled == enabled {
            return Ok(());
        }

        if enabled {
            let runtime = Handle::try_current().map_err(|e| {
                DeviceLocationError::InvalidState(format!(
                    "cannot track map {} outside a Tokio runtime: {}",
                    map.id(),
                    e
                ))
            })?;
            binding.follower = Some(self.spawn_follower(&runtime, map));
        } else if let Some(follower) = binding.follower.take() {
            follower.stop(&self.device.events());
        }
        binding.enabled = enabled;
        info!(
            "Device location {} for map {}",
            if enabled { "enabled" } else { "disabled" },
            map.id()
        );
        Ok(())
    }

    pub fn is_device_location_enabled(&self, map: &MapView) -> bool {
        read(&self.maps).get(map.id()).map_or(false, |b| b.enabled)
    }

    /// Options of `map`, or the defaults if none were set
    pub fn get_device_location_options(&self, map: &MapView) -> MapDeviceLocationOptions {
        read(&self.maps)
            .get(map.id())
            .map(|b| b.options)
            .unwrap_or_default()
    }

    /// Requires an open source and tracking enabled for `map`
    pub fn set_device_location_options(
        &self,
        map: &MapView,
        options: MapDeviceLocationOptions,
    ) -> Result<()> {
        if self.device.get_source().is_none() {
            return Err(DeviceLocationError::InvalidState(
                "no device location source is open".into(),
            ));
        }

        let mut maps = write(&self.maps);
        match maps.get_mut(map.id()) {
            Some(binding) if binding.enabled => {
                binding.options = options;
                debug!("Map {} device location options: {:?}", map.id(), options);
                Ok(())
            }
            _ => Err(not_enabled(map)),
        }
    }

    /// True when `map` tracks the device and shows its location
    pub fn shows_device_location(&self, map: &MapView) -> bool {
        read(&self.maps)
            .get(map.id())
            .map_or(false, |b| b.enabled && b.options.device_location_visibility)
    }

    /// Recenter (or zoom) `map` on the latest snapshot. Without a snapshot
    /// yet, or when the latest one is not a valid fix, this does nothing.
    pub async fn zoom_or_pan_to_current_location(&self, map: &MapView, zoom: bool) -> Result<()> {
        if !self.is_device_location_enabled(map) {
            return Err(not_enabled(map));
        }

        let snapshot = match self.device.get_current_snapshot() {
            Some(s) if s.valid => s,
            Some(_) => {
                debug!("Latest location is not a valid fix; map {} stays put", map.id());
                return Ok(());
            }
            None => {
                debug!("No location yet for map {}", map.id());
                return Ok(());
            }
        };

        let transform = self.device.transform();
        let scale = self.zoom_scale;
        map.with_viewport(|viewport| {
            let point = transform.project(&snapshot.position, viewport.spatial_reference())?;
            if zoom {
                viewport.zoom_to(&point, scale)
            } else {
                viewport.pan_to(&point)
            }
        })
        .await
    }

    /// Forget everything about `map`
    pub fn end_map_session(&self, map: &MapView) {
        let binding = write(&self.maps).remove(map.id());
        if let Some(follower) = binding.and_then(|b| b.follower) {
            follower.stop(&self.device.events());
        }
    }

    fn spawn_follower(&self, runtime: &Handle, map: &MapView) -> Follower {
        let (subscription, rx) = self.device.subscribe_channel();
        let task = runtime.spawn(follow(
            map.clone(),
            Arc::clone(&self.maps),
            self.device.transform(),
            rx,
        ));
        Follower { subscription, task }
    }
}

impl Drop for MapDeviceLocationService {
    fn drop(&mut self) {
        let bus = self.device.events();
        for (_, binding) in write(&self.maps).drain() {
            if let Some(follower) = binding.follower {
                follower.stop(&bus);
            }
        }
    }
}

/// Applies the navigation mode of `map` to each valid snapshot
async fn follow(
    map: MapView,
    maps: Bindings,
    transform: Arc<dyn CoordinateTransform>,
    mut rx: mpsc::Receiver<SnapshotEvent>,
) {
    while let Some(event) = rx.recv().await {
        let snapshot = match event {
            SnapshotEvent::Snapshot(s) if s.valid => s,
            _ => continue,
        };

        let options = match read(&maps).get(map.id()) {
            Some(binding) if binding.enabled => binding.options,
            _ => continue,
        };
        if !options.recenters() {
            continue;
        }

        if let Err(e) = navigate(&map, transform.as_ref(), &snapshot, options).await {
            warn!("Navigation update for map {} failed: {}", map.id(), e);
        }
    }
}

async fn navigate(
    map: &MapView,
    transform: &dyn CoordinateTransform,
    snapshot: &Snapshot,
    options: MapDeviceLocationOptions,
) -> Result<()> {
    map.with_viewport(|viewport| {
        let point = transform.project(&snapshot.position, viewport.spatial_reference())?;
        viewport.pan_to(&point)?;
        if options.rotates() {
            if let Some(course) = snapshot.course {
                viewport.rotate_to(course)?;
            }
        }
        Ok(())
    })
    .await
}

fn not_enabled(map: &MapView) -> DeviceLocationError {
    DeviceLocationError::InvalidState(format!(
        "device location is not enabled for map {}",
        map.id()
    ))
}

fn read(maps: &Bindings) -> std::sync::RwLockReadGuard<'_, HashMap<MapId, MapBinding>> {
    maps.read().unwrap_or_else(|e| e.into_inner())
}

fn write(maps: &Bindings) -> std::sync::RwLockWriteGuard<'_, HashMap<MapId, MapBinding>> {
    maps.write().unwrap_or_else(|e| e.into_inner())
}
