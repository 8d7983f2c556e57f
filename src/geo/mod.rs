//! Geodesy utilities.
//!
//! Provides the geographic bounding box used by map requests, great-circle
//! distance, and the statistics helpers shared by the mismatch engine and
//! the path sampler.

mod stats;

pub use stats::{mean, mean_removed_mse, percentile};

use ::geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Approximate ground length of one degree at the equator, in meters.
///
/// Path sampling resolutions are specified in degrees and converted with
/// this flat factor rather than a latitude-dependent one.
pub const METERS_PER_DEGREE: f64 = 111_139.0;

/// Geographic bounding box in WGS84 degrees.
///
/// Invariant: `west < east` and `south < north` (checked on construction).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge in degrees East
    pub west: f64,
    /// Southern edge in degrees North
    pub south: f64,
    /// Eastern edge in degrees East
    pub east: f64,
    /// Northern edge in degrees North
    pub north: f64,
}

impl BoundingBox {
    /// Create a bounding box, normalizing longitudes to [-180, 180].
    ///
    /// Returns a validation error if the box is empty or inverted after
    /// normalization.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        let west = normalize_lon(west);
        let east = normalize_lon(east);

        if !west.is_finite() || !south.is_finite() || !east.is_finite() || !north.is_finite() {
            return Err(EngineError::validation(
                "bounding box coordinates must be finite numbers",
            ));
        }
        if west >= east {
            return Err(EngineError::validation(format!(
                "bounding box requires W < E, got W={west}, E={east}"
            )));
        }
        if south >= north {
            return Err(EngineError::validation(format!(
                "bounding box requires S < N, got S={south}, N={north}"
            )));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(EngineError::validation(
                "latitudes must be within [-90, 90] degrees",
            ));
        }

        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Check whether a point lies inside the box (edges inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Center of the box as `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }
}

/// Wrap a longitude into [-180, 180].
fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
        if wrapped == -180.0 { 180.0 } else { wrapped }
    }
}

/// Great-circle distance between two `(lon, lat)` points, in meters.
pub fn haversine_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    #[test]
    fn test_bbox_valid() {
        let bbox = BoundingBox::new(-18.0, 4.0, 16.0, 51.0).unwrap();
        assert!((bbox.width() - 34.0).abs() < TOL);
        assert!((bbox.height() - 47.0).abs() < TOL);
        assert!(bbox.contains(0.0, 30.0));
        assert!(!bbox.contains(20.0, 30.0));
    }

    #[test]
    fn test_bbox_inverted_rejected() {
        assert!(BoundingBox::new(16.0, 4.0, -18.0, 51.0).is_err());
        assert!(BoundingBox::new(-18.0, 51.0, 16.0, 4.0).is_err());
        assert!(BoundingBox::new(0.0, 10.0, 0.0, 20.0).is_err());
    }

    #[test]
    fn test_bbox_longitude_normalization() {
        // 350 E wraps to -10 E
        let bbox = BoundingBox::new(350.0, 4.0, 16.0, 51.0).unwrap();
        assert!((bbox.west - (-10.0)).abs() < TOL);
    }

    #[test]
    fn test_haversine_equator_degree() {
        // One degree of longitude at the equator is about 111.2 km
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn test_haversine_zero() {
        assert!(haversine_distance(8.47, 48.89, 8.47, 48.89).abs() < TOL);
    }
}
