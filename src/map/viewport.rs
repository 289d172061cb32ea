// src/map/viewport.rs
//! The map viewport seam

use crate::{error::Result, location::{MapPoint, SpatialReference}};
use std::{fmt, sync::Arc};
use tokio::sync::Mutex;

/// Mutates what a map shows. Implemented by the host's map view.
pub trait MapViewport: Send {
    fn spatial_reference(&self) -> SpatialReference;

    fn pan_to(&mut self, center: &MapPoint) -> Result<()>;

    /// `scale` is the map scale denominator (5000 for 1:5000)
    fn zoom_to(&mut self, center: &MapPoint, scale: f64) -> Result<()>;

    /// Rotate so `heading` (degrees from north) points up
    fn rotate_to(&mut self, heading: f64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapId(String);

impl MapId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MapId {
    fn from(id: &str) -> Self {
        MapId(id.to_string())
    }
}

impl From<String> for MapId {
    fn from(id: String) -> Self {
        MapId(id)
    }
}

/// A map and its viewport. All viewport mutations go through
/// [`with_viewport`](Self::with_viewport), one at a time per map.
#[derive(Clone)]
pub struct MapView {
    id: MapId,
    viewport: Arc<Mutex<Box<dyn MapViewport>>>,
}

impl MapView {
    pub fn new(id: impl Into<MapId>, viewport: impl MapViewport + 'static) -> Self {
        Self {
            id: id.into(),
            viewport: Arc::new(Mutex::new(Box::new(viewport))),
        }
    }

    pub fn id(&self) -> &MapId {
        &self.id
    }

    pub async fn with_viewport<R>(&self, f: impl FnOnce(&mut dyn MapViewport) -> R) -> R {
        let mut viewport = self.viewport.lock().await;
        f(viewport.as_mut())
    }
}

impl fmt::Debug for MapView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapView").field("id", &self.id).finish_non_exhaustive()
    }
}
