// src/location/geometry.rs
//! Points, spatial references and the coordinate transform seam

use crate::error::{DeviceLocationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Latitude limit of the Web Mercator projection
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_6;

/// A spatial reference identified by its well-known id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialReference {
    pub wkid: u32,
}

impl SpatialReference {
    pub const WGS84: SpatialReference = SpatialReference { wkid: 4326 };
    pub const WEB_MERCATOR: SpatialReference = SpatialReference { wkid: 3857 };

    pub fn new(wkid: u32) -> Self {
        // 102100 is the legacy id of Web Mercator
        if wkid == 102100 {
            return Self::WEB_MERCATOR;
        }
        Self { wkid }
    }

    pub fn is_geographic(&self) -> bool {
        self.wkid == Self::WGS84.wkid
    }
}

impl Default for SpatialReference {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.wkid)
    }
}

/// A point in a given spatial reference. For geographic references `x` is
/// longitude and `y` latitude, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub spatial_reference: SpatialReference,
}

impl MapPoint {
    pub fn new(x: f64, y: f64, z: Option<f64>, spatial_reference: SpatialReference) -> Self {
        Self { x, y, z, spatial_reference }
    }

    pub fn from_lon_lat(longitude: f64, latitude: f64, altitude: Option<f64>) -> Self {
        Self::new(longitude, latitude, altitude, SpatialReference::WGS84)
    }

    pub fn is_empty(&self) -> bool {
        !self.x.is_finite() || !self.y.is_finite()
    }
}

/// Projects points between spatial references.
///
/// This is the boundary to whatever projection engine the host provides;
/// [`GeographicTransform`] covers WGS84 and Web Mercator.
pub trait CoordinateTransform: Send + Sync {
    fn project(&self, point: &MapPoint, target: SpatialReference) -> Result<MapPoint>;
}

/// Built-in transform between WGS84 (4326) and Web Mercator (3857)
#[derive(Debug, Clone, Copy, Default)]
pub struct GeographicTransform;

impl CoordinateTransform for GeographicTransform {
    fn project(&self, point: &MapPoint, target: SpatialReference) -> Result<MapPoint> {
        let from = point.spatial_reference;
        if from == target {
            return Ok(*point);
        }

        match (from, target) {
            (SpatialReference::WGS84, SpatialReference::WEB_MERCATOR) => {
                let lat = point.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
                let x = EARTH_RADIUS_M * point.x.to_radians();
                let y = EARTH_RADIUS_M
                    * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                Ok(MapPoint::new(x, y, point.z, target))
            }
            (SpatialReference::WEB_MERCATOR, SpatialReference::WGS84) => {
                let lon = (point.x / EARTH_RADIUS_M).to_degrees();
                let lat = (2.0 * (point.y / EARTH_RADIUS_M).exp().atan()
                    - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                Ok(MapPoint::new(lon, lat, point.z, target))
            }
            _ => Err(DeviceLocationError::Projection(format!(
                "no transform from {} to {}",
                from, target
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_projection() {
        let pt = MapPoint::from_lon_lat(11.5, 48.1, Some(545.4));
        let out = GeographicTransform.project(&pt, SpatialReference::WGS84).unwrap();
        assert_eq!(out, pt);
    }

    #[test]
    fn test_wgs84_to_web_mercator() {
        let pt = MapPoint::from_lon_lat(180.0, 0.0, None);
        let out = GeographicTransform
            .project(&pt, SpatialReference::WEB_MERCATOR)
            .unwrap();
        assert!((out.x - 20_037_508.342_789_244).abs() < 1e-3);
        assert!(out.y.abs() < 1e-6);
        assert_eq!(out.spatial_reference, SpatialReference::WEB_MERCATOR);
    }

    #[test]
    fn test_web_mercator_back_to_wgs84() {
        let pt = MapPoint::from_lon_lat(-122.4194, 37.7749, Some(16.0));
        let merc = GeographicTransform
            .project(&pt, SpatialReference::WEB_MERCATOR)
            .unwrap();
        let back = GeographicTransform.project(&merc, SpatialReference::WGS84).unwrap();
        assert!((back.x - pt.x).abs() < 1e-9);
        assert!((back.y - pt.y).abs() < 1e-9);
        assert_eq!(back.z, Some(16.0));
    }

    #[test]
    fn test_unsupported_projection() {
        let pt = MapPoint::from_lon_lat(0.0, 0.0, None);
        let err = GeographicTransform
            .project(&pt, SpatialReference::new(32633))
            .unwrap_err();
        assert!(matches!(err, DeviceLocationError::Projection(_)));
    }

    #[test]
    fn test_legacy_web_mercator_wkid() {
        assert_eq!(SpatialReference::new(102100), SpatialReference::WEB_MERCATOR);
    }
}
