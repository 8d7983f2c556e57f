//! Path resampling and along-path extraction.
//!
//! A request polyline is resampled at a fixed spatial step along its
//! segments; each resampled point carries its cumulative distance from the
//! path start and the index of the nearest original path station
//! (`step_id`). Elevation queries aggregate ground-elevation percentiles
//! around each resampled point; variable queries look up reanalysis
//! variables at the original path stations.

use serde::Serialize;

use crate::access::{retry_once, Dataset, ElevationAccessor, ReanalysisAccessor};
use crate::barometric;
use crate::error::{EngineError, Result};
use crate::geo::{haversine_distance, METERS_PER_DEGREE};
use crate::temporal::match_time;

/// One resampled point along a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathPoint {
    /// Longitude in degrees East
    pub lon: f64,
    /// Latitude in degrees North
    pub lat: f64,
    /// Cumulative great-circle distance from the path start [m]
    pub distance: f64,
    /// Index of the nearest original path station
    pub step_id: usize,
}

/// Resample a polyline at `sampling_scale_deg` degrees of ground distance.
///
/// Every original vertex appears in the output; interior samples are
/// spaced `sampling_scale_deg * 111139` m apart along each segment, with
/// positions linearly interpolated between the segment endpoints. Output
/// preserves input order and `step_id` is non-decreasing.
pub fn resample_path(vertices: &[(f64, f64)], sampling_scale_deg: f64) -> Result<Vec<PathPoint>> {
    if vertices.len() < 2 {
        return Err(EngineError::computation(format!(
            "path needs at least 2 points, got {}",
            vertices.len()
        )));
    }
    if !sampling_scale_deg.is_finite() || sampling_scale_deg <= 0.0 {
        return Err(EngineError::validation(
            "samplingScale should be a positive number",
        ));
    }

    let step = sampling_scale_deg * METERS_PER_DEGREE;
    let mut points = Vec::new();
    let mut cumulative = 0.0;

    for (i, pair) in vertices.windows(2).enumerate() {
        let (lon0, lat0) = pair[0];
        let (lon1, lat1) = pair[1];
        let length = haversine_distance(lon0, lat0, lon1, lat1);

        let mut along = 0.0;
        while along < length {
            let frac = along / length;
            points.push(PathPoint {
                lon: lon0 + (lon1 - lon0) * frac,
                lat: lat0 + (lat1 - lat0) * frac,
                distance: cumulative + along,
                step_id: if frac < 0.5 { i } else { i + 1 },
            });
            along += step;
        }
        cumulative += length;
    }

    // The loop never emits the final vertex exactly; close the path.
    let (lon, lat) = vertices[vertices.len() - 1];
    points.push(PathPoint {
        lon,
        lat,
        distance: cumulative,
        step_id: vertices.len() - 1,
    });

    Ok(points)
}

/// Ground-elevation percentiles along a resampled path.
#[derive(Debug, Clone, Serialize)]
pub struct ElevationPath {
    /// Resampled path points
    pub points: Vec<PathPoint>,
    /// Requested percentiles, as given
    pub percentiles: Vec<f64>,
    /// One elevation array per percentile, parallel to `points`
    pub elevation: Vec<Vec<f64>>,
}

/// Compute elevation percentiles around each resampled path point.
///
/// `scale_deg` is the ground-truth aggregation neighborhood,
/// `sampling_scale_deg` the path resampling resolution.
pub fn elevation_along_path<E: ElevationAccessor>(
    elevation: &E,
    vertices: &[(f64, f64)],
    scale_deg: f64,
    sampling_scale_deg: f64,
    percentiles: &[f64],
) -> Result<ElevationPath> {
    if !scale_deg.is_finite() || scale_deg <= 0.0 {
        return Err(EngineError::validation("scale should be a positive number"));
    }
    if percentiles.is_empty() {
        return Err(EngineError::validation("percentile must not be empty"));
    }
    for &p in percentiles {
        if !(0.0..=100.0).contains(&p) {
            return Err(EngineError::validation(format!(
                "percentile {p} outside [0, 100]"
            )));
        }
    }

    let points = resample_path(vertices, sampling_scale_deg)?;
    let mut per_percentile = vec![Vec::with_capacity(points.len()); percentiles.len()];

    for point in &points {
        let values = retry_once(|| {
            elevation.percentiles_at(point.lon, point.lat, scale_deg, percentiles)
        })?;
        for (column, value) in per_percentile.iter_mut().zip(values) {
            column.push(value);
        }
    }

    Ok(ElevationPath {
        points,
        percentiles: percentiles.to_vec(),
        elevation: per_percentile,
    })
}

/// Extracted reanalysis values for a contiguous slice of path stations.
#[derive(Debug, Clone, Serialize)]
pub struct VariableChunk {
    /// Effective (matched) reference timestamps
    pub time: Vec<i64>,
    /// Altitude per station when geolocator pressure was supplied;
    /// NaN over cells without reference coverage
    pub altitude: Option<Vec<f64>>,
    /// One value array per requested variable name, NaN where the
    /// selected dataset has no coverage
    pub variables: Vec<Vec<f64>>,
}

/// Look up the requested variables (and optionally altitude) at each
/// path station/time pair.
///
/// `points`, `times`, and `pressure` (when present) are parallel arrays.
/// Chunking across this function is purely a payload-size bound; merging
/// chunks in order reproduces the unchunked output exactly.
pub fn extract_variables<R: ReanalysisAccessor>(
    reanalysis: &R,
    points: &[(f64, f64)],
    times: &[i64],
    pressure: Option<&[f64]>,
    variables: &[String],
    dataset: Dataset,
) -> Result<VariableChunk> {
    let mut matched = Vec::with_capacity(times.len());
    let mut altitude = pressure.map(|_| Vec::with_capacity(times.len()));
    let mut columns = vec![Vec::with_capacity(times.len()); variables.len()];

    for (i, (&(lon, lat), &t)) in points.iter().zip(times.iter()).enumerate() {
        matched.push(match_time(t).matched);

        for (name, column) in variables.iter().zip(columns.iter_mut()) {
            let value = retry_once(|| reanalysis.variable_at(name, lon, lat, t, dataset))?;
            column.push(value.unwrap_or(f64::NAN));
        }

        if let (Some(alts), Some(p)) = (altitude.as_mut(), pressure) {
            match retry_once(|| reanalysis.sample_at(lon, lat, t))? {
                Some(sample) => {
                    alts.push(barometric::altitude(
                        p[i],
                        sample.surface_pressure,
                        sample.temperature,
                    )?);
                }
                None => alts.push(f64::NAN),
            }
        }
    }

    Ok(VariableChunk {
        time: matched,
        altitude,
        variables: columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_point_path_documented_example() {
        let path = vec![(8.47, 48.89), (9.41, 44.78)];
        let points = resample_path(&path, 1.0).unwrap();

        assert!(points.len() >= 3);
        assert_eq!(points[0].distance, 0.0);
        for pair in points.windows(2) {
            assert!(pair[1].distance > pair[0].distance);
        }
        for pair in points.windows(2) {
            assert!(pair[1].step_id >= pair[0].step_id);
        }
        // Original vertices carry their own station ids
        assert_eq!(points[0].step_id, 0);
        assert_eq!(points.last().unwrap().step_id, 1);
        assert_eq!(
            (points[0].lon, points[0].lat),
            (8.47, 48.89)
        );
        let last = points.last().unwrap();
        assert_eq!((last.lon, last.lat), (9.41, 44.78));
    }

    #[test]
    fn test_resample_spacing() {
        // One degree of latitude, sampled every 0.25 degrees
        let path = vec![(0.0, 0.0), (0.0, 1.0)];
        let points = resample_path(&path, 0.25).unwrap();
        // Four interior steps plus the near-end sample and the closing vertex
        assert_eq!(points.len(), 6);
        let spacing = points[1].distance - points[0].distance;
        assert!((spacing - 0.25 * METERS_PER_DEGREE).abs() < 1.0, "got {spacing}");
    }

    #[test]
    fn test_step_id_tracks_nearest_station() {
        let path = vec![(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)];
        let points = resample_path(&path, 0.25).unwrap();

        // Samples in the first half of segment 0 belong to station 0
        assert_eq!(points[0].step_id, 0);
        assert_eq!(points[1].step_id, 0);
        // Past the midpoint they belong to station 1
        assert_eq!(points[3].step_id, 1);
        assert_eq!(points.last().unwrap().step_id, 2);
    }

    #[test]
    fn test_degenerate_path_rejected() {
        let err = resample_path(&[(8.47, 48.89)], 1.0).unwrap_err();
        assert!(matches!(err, EngineError::Computation { .. }));
    }

    #[test]
    fn test_bad_sampling_scale_rejected() {
        let path = vec![(0.0, 0.0), (0.0, 1.0)];
        assert!(resample_path(&path, 0.0).is_err());
        assert!(resample_path(&path, f64::NAN).is_err());
    }
}
