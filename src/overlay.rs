// src/overlay.rs
//! Draws the device location on a map's graphics overlay

use crate::{
    error::Result,
    events::{SnapshotEvent, SnapshotEventBus, SubscriptionHandle},
    location::{MapPoint, SpatialReference},
    map::{MapDeviceLocationService, MapView},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStyle {
    Circle,
    Square,
    Triangle,
    Diamond,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSymbol {
    pub color: Rgb,
    /// Points
    pub size: f64,
    pub style: MarkerStyle,
}

impl Default for PointSymbol {
    fn default() -> Self {
        Self {
            color: Rgb::new(125, 125, 0),
            size: 10.0,
            style: MarkerStyle::Triangle,
        }
    }
}

/// Graphics sink of the host's map
pub trait GraphicOverlay: Send {
    fn spatial_reference(&self) -> SpatialReference;

    fn add_point(&mut self, point: &MapPoint, symbol: &PointSymbol) -> Result<()>;

    fn clear(&mut self) -> Result<()>;
}

/// Keeps a single marker at the latest valid location of the device.
///
/// The marker shows only while the map tracks the device with visibility
/// on, and is removed when the connection is lost. Dropping the overlay
/// unsubscribes it.
pub struct LocationOverlay {
    bus: SnapshotEventBus,
    subscription: SubscriptionHandle,
}

impl LocationOverlay {
    pub fn attach(
        maps: Arc<MapDeviceLocationService>,
        map: MapView,
        overlay: impl GraphicOverlay + 'static,
        symbol: PointSymbol,
    ) -> Self {
        let bus = maps.device().events();
        let transform = maps.device().transform();
        let overlay = Mutex::new(overlay);

        let subscription = bus.subscribe(move |event| {
            let mut overlay = overlay.lock().unwrap_or_else(|e| e.into_inner());
            match event {
                SnapshotEvent::Snapshot(snapshot) => {
                    if !maps.shows_device_location(&map) {
                        return overlay.clear().map_err(Into::into);
                    }
                    if !snapshot.valid {
                        return Ok(());
                    }
                    let point = transform.project(&snapshot.position, overlay.spatial_reference())?;
                    overlay.clear()?;
                    overlay.add_point(&point, &symbol)?;
                }
                SnapshotEvent::ConnectionLost { .. } => {
                    debug!("Clearing location marker of map {}", map.id());
                    overlay.clear()?;
                }
            }
            Ok(())
        });

        Self { bus, subscription }
    }

    pub fn detach(self) {}
}

impl Drop for LocationOverlay {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        location::{encode_sentence, DeviceLocationSource, MemoryFeed, MemorySource},
        map::{MapDeviceLocationOptions, MapViewport},
        service::{DeviceLocationProperties, DeviceLocationService},
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Drawn {
        Point(MapPoint, PointSymbol),
        Cleared,
    }

    struct RecordingOverlay {
        drawn: Arc<Mutex<Vec<Drawn>>>,
    }

    impl GraphicOverlay for RecordingOverlay {
        fn spatial_reference(&self) -> SpatialReference {
            SpatialReference::WEB_MERCATOR
        }

        fn add_point(&mut self, point: &MapPoint, symbol: &PointSymbol) -> Result<()> {
            self.drawn.lock().unwrap().push(Drawn::Point(*point, *symbol));
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            self.drawn.lock().unwrap().push(Drawn::Cleared);
            Ok(())
        }
    }

    struct StillViewport;

    impl MapViewport for StillViewport {
        fn spatial_reference(&self) -> SpatialReference {
            SpatialReference::WGS84
        }

        fn pan_to(&mut self, _center: &MapPoint) -> Result<()> {
            Ok(())
        }

        fn zoom_to(&mut self, _center: &MapPoint, _scale: f64) -> Result<()> {
            Ok(())
        }

        fn rotate_to(&mut self, _heading: f64) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        device: Arc<DeviceLocationService>,
        maps: Arc<MapDeviceLocationService>,
        map: MapView,
        feed: MemoryFeed,
        rx: mpsc::Receiver<SnapshotEvent>,
        drawn: Arc<Mutex<Vec<Drawn>>>,
    }

    async fn fixture() -> (Fixture, LocationOverlay) {
        let device = Arc::new(DeviceLocationService::default());
        let maps = Arc::new(MapDeviceLocationService::new(Arc::clone(&device)));
        let map = MapView::new("main", StillViewport);
        let drawn = Arc::new(Mutex::new(Vec::new()));

        let overlay = LocationOverlay::attach(
            Arc::clone(&maps),
            map.clone(),
            RecordingOverlay {
                drawn: Arc::clone(&drawn),
            },
            PointSymbol::default(),
        );
        // Subscribed after the overlay, so its events arrive once the
        // overlay has handled them
        let (_handle, rx) = device.events().subscribe_channel(16);

        let (source, feed) = MemorySource::new(16);
        device
            .open(DeviceLocationSource::Memory(source), DeviceLocationProperties::default())
            .await
            .unwrap();

        let fixture = Fixture {
            device,
            maps,
            map,
            feed,
            rx,
            drawn,
        };
        (fixture, overlay)
    }

    fn gga_at(time: &str, quality: u8) -> String {
        encode_sentence(&format!(
            "GPGGA,{},4807.038,N,01131.000,E,{},08,0.9,545.4,M,46.9,M,,",
            time, quality
        ))
    }

    async fn deliver(fixture: &mut Fixture, line: String) {
        fixture.feed.send_line(line).await;
        tokio::time::timeout(Duration::from_secs(5), fixture.rx.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_default_symbol() {
        let symbol = PointSymbol::default();
        assert_eq!(symbol.color, Rgb::new(125, 125, 0));
        assert_eq!(symbol.size, 10.0);
        assert_eq!(symbol.style, MarkerStyle::Triangle);
    }

    #[tokio::test]
    async fn test_marker_follows_valid_locations() {
        let (mut fixture, _overlay) = fixture().await;
        fixture.maps.set_device_location_enabled(&fixture.map, true).unwrap();

        deliver(&mut fixture, gga_at("100001", 1)).await;
        deliver(&mut fixture, gga_at("100002", 0)).await;

        let drawn = fixture.drawn.lock().unwrap().clone();
        assert_eq!(drawn.len(), 2);
        assert_eq!(drawn[0], Drawn::Cleared);
        match &drawn[1] {
            Drawn::Point(point, symbol) => {
                assert_eq!(point.spatial_reference, SpatialReference::WEB_MERCATOR);
                assert_eq!(*symbol, PointSymbol::default());
            }
            other => panic!("expected a point, got {:?}", other),
        }

        fixture.device.close().await;
    }

    #[tokio::test]
    async fn test_hidden_when_not_visible() {
        let (mut fixture, _overlay) = fixture().await;

        // Not tracking yet
        deliver(&mut fixture, gga_at("100001", 1)).await;

        fixture.maps.set_device_location_enabled(&fixture.map, true).unwrap();
        fixture
            .maps
            .set_device_location_options(
                &fixture.map,
                MapDeviceLocationOptions {
                    device_location_visibility: false,
                    ..MapDeviceLocationOptions::default()
                },
            )
            .unwrap();
        deliver(&mut fixture, gga_at("100002", 1)).await;

        let drawn = fixture.drawn.lock().unwrap().clone();
        assert_eq!(drawn, vec![Drawn::Cleared, Drawn::Cleared]);

        fixture.device.close().await;
    }

    #[tokio::test]
    async fn test_cleared_on_connection_loss() {
        let (mut fixture, _overlay) = fixture().await;
        fixture.maps.set_device_location_enabled(&fixture.map, true).unwrap();
        deliver(&mut fixture, gga_at("100001", 1)).await;

        drop(std::mem::replace(&mut fixture.feed, MemorySource::new(1).1));
        let event = tokio::time::timeout(Duration::from_secs(5), fixture.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.is_terminal());

        let drawn = fixture.drawn.lock().unwrap().clone();
        assert_eq!(drawn.last(), Some(&Drawn::Cleared));
        assert_eq!(drawn.len(), 3);
    }

    #[tokio::test]
    async fn test_detach_unsubscribes() {
        let (mut fixture, overlay) = fixture().await;
        fixture.maps.set_device_location_enabled(&fixture.map, true).unwrap();
        let before = fixture.device.events().subscriber_count();

        overlay.detach();
        assert_eq!(fixture.device.events().subscriber_count(), before - 1);

        deliver(&mut fixture, gga_at("100001", 1)).await;
        assert!(fixture.drawn.lock().unwrap().is_empty());

        fixture.device.close().await;
    }
}
