//! Request validation and the response envelope.
//!
//! One request type per mode, mirroring the parameter tables of the public
//! API. Validation happens before any computation; a failed validation
//! produces a structured error envelope and nothing else runs.

mod orchestrator;

pub use orchestrator::Orchestrator;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::access::Dataset;
use crate::error::{EngineError, Result};
use crate::geo::BoundingBox;
use crate::mismatch::{GridSpec, MapOptions, RasterDescriptor};
use crate::series::{Label, LabeledTimeseries, PressureSeries};

fn default_scale() -> f64 {
    10.0
}

/// Request-level pressure bounds check, surfaced as a validation error.
fn check_pressure_bounds(pressure: &[f64]) -> Result<()> {
    use crate::barometric::{PRESSURE_MAX, PRESSURE_MIN};
    for &p in pressure {
        if !p.is_finite() || !(PRESSURE_MIN..=PRESSURE_MAX).contains(&p) {
            return Err(EngineError::validation(format!(
                "pressure {p} Pa outside plausible range [{PRESSURE_MIN}, {PRESSURE_MAX}]"
            )));
        }
    }
    Ok(())
}

fn default_percentiles() -> Vec<f64> {
    vec![10.0, 50.0, 90.0]
}

fn default_workers() -> usize {
    10
}

/// Map-mode request: a labeled pressure timeseries over a bounding box.
#[derive(Debug, Clone, Deserialize)]
pub struct MapRequest {
    /// Western edge of the bounding box, degrees
    #[serde(rename = "W")]
    pub west: f64,
    /// Southern edge, degrees
    #[serde(rename = "S")]
    pub south: f64,
    /// Eastern edge, degrees
    #[serde(rename = "E")]
    pub east: f64,
    /// Northern edge, degrees
    #[serde(rename = "N")]
    pub north: f64,
    /// Sample timestamps, unix seconds
    pub time: Vec<i64>,
    /// Measured pressure, Pascals
    pub pressure: Vec<f64>,
    /// Group label per sample
    pub label: Vec<Label>,
    /// Pixels per degree
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Engine tunables
    #[serde(flatten)]
    pub options: MapOptions,
}

impl MapRequest {
    /// Validate the request into a series and a grid geometry.
    pub fn validate(&self) -> Result<(LabeledTimeseries, GridSpec)> {
        let series = LabeledTimeseries::new(
            self.time.clone(),
            self.pressure.clone(),
            self.label.clone(),
        )?;
        check_pressure_bounds(&self.pressure)?;
        let bbox = BoundingBox::new(self.west, self.south, self.east, self.north)?;
        let spec = GridSpec::new(bbox, self.scale)?;
        self.options.validate()?;
        Ok((series, spec))
    }
}

/// Timeseries-mode request: reference pressure (and altitude) at a point.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeseriesRequest {
    /// Longitude of the query point, degrees
    pub lon: f64,
    /// Latitude of the query point, degrees
    pub lat: f64,
    /// Sample timestamps; paired with `pressure`
    #[serde(default)]
    pub time: Option<Vec<i64>>,
    /// Measured pressure; paired with `time`
    #[serde(default)]
    pub pressure: Option<Vec<f64>>,
    /// Range start, used when no explicit timestamps are given
    #[serde(default, rename = "startTime")]
    pub start_time: Option<i64>,
    /// Range end (inclusive)
    #[serde(default, rename = "endTime")]
    pub end_time: Option<i64>,
}

/// Validated timeseries input: an explicit series or a time range.
#[derive(Debug, Clone)]
pub enum TimeseriesInput {
    /// Caller-supplied timestamps and pressure; output gains an altitude
    /// column
    Explicit(PressureSeries),
    /// Hourly range request; output has no altitude column
    Range {
        /// Range start, unix seconds
        start: i64,
        /// Range end, unix seconds (inclusive)
        end: i64,
    },
}

impl TimeseriesRequest {
    /// Validate into explicit-series or range form.
    pub fn validate(&self) -> Result<TimeseriesInput> {
        if !self.lon.is_finite() || !self.lat.is_finite() {
            return Err(EngineError::validation("lon and lat must be finite numbers"));
        }
        match (&self.time, &self.pressure) {
            (Some(time), Some(pressure)) => {
                check_pressure_bounds(pressure)?;
                Ok(TimeseriesInput::Explicit(PressureSeries::new(
                    time.clone(),
                    pressure.clone(),
                )?))
            }
            (None, None) => match (self.start_time, self.end_time) {
                (Some(start), Some(end)) => {
                    if end < start {
                        return Err(EngineError::validation(format!(
                            "endTime ({end}) must not be earlier than startTime ({start})"
                        )));
                    }
                    Ok(TimeseriesInput::Range { start, end })
                }
                _ => Err(EngineError::validation(
                    "startTime and endTime OR time and pressure arrays are mandatory",
                )),
            },
            _ => Err(EngineError::validation(
                "time and pressure must be supplied together",
            )),
        }
    }
}

/// Elevation-path request: ground-elevation percentiles along a polyline.
#[derive(Debug, Clone, Deserialize)]
pub struct ElevationPathRequest {
    /// Path vertex longitudes, degrees
    pub lon: Vec<f64>,
    /// Path vertex latitudes, degrees
    pub lat: Vec<f64>,
    /// Ground-truth aggregation resolution, degrees
    pub scale: f64,
    /// Path resampling resolution, degrees
    #[serde(rename = "samplingScale")]
    pub sampling_scale: f64,
    /// Percentiles to report
    #[serde(default = "default_percentiles")]
    pub percentile: Vec<f64>,
}

impl ElevationPathRequest {
    /// Validate into the vertex list.
    pub fn validate(&self) -> Result<Vec<(f64, f64)>> {
        zip_path(&self.lon, &self.lat)
    }
}

/// Variable-path request: reanalysis variables at each path station.
#[derive(Debug, Clone, Deserialize)]
pub struct VariablePathRequest {
    /// Station longitudes, degrees
    pub lon: Vec<f64>,
    /// Station latitudes, degrees
    pub lat: Vec<f64>,
    /// Station timestamps, unix seconds
    pub time: Vec<i64>,
    /// Reanalysis variable names to extract
    pub variable: Vec<String>,
    /// Measured pressure per station; enables the altitude output
    #[serde(default)]
    pub pressure: Option<Vec<f64>>,
    /// Which reanalysis collection to read
    #[serde(default)]
    pub dataset: Dataset,
    /// Number of contiguous chunks for concurrent extraction
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl VariablePathRequest {
    /// Validate into the station list.
    pub fn validate(&self) -> Result<Vec<(f64, f64)>> {
        let points = zip_path(&self.lon, &self.lat)?;
        if points.len() != self.time.len() {
            return Err(EngineError::validation(
                "pressure, time and path should have the same length",
            ));
        }
        if let Some(pressure) = &self.pressure {
            if pressure.len() != points.len() {
                return Err(EngineError::validation(
                    "pressure, time and path should have the same length",
                ));
            }
            check_pressure_bounds(pressure)?;
        }
        if self.variable.is_empty() {
            return Err(EngineError::validation(
                "variable should be a non-empty array of reanalysis band names",
            ));
        }
        if self.workers == 0 {
            return Err(EngineError::validation("workers must be at least 1"));
        }
        Ok(points)
    }
}

fn zip_path(lon: &[f64], lat: &[f64]) -> Result<Vec<(f64, f64)>> {
    if lon.len() != lat.len() {
        return Err(EngineError::validation(
            "lon and lat need to have the same length",
        ));
    }
    if lon.is_empty() {
        return Err(EngineError::validation("path must not be empty"));
    }
    Ok(lon.iter().cloned().zip(lat.iter().cloned()).collect())
}

/// A request in any of the four modes.
#[derive(Debug, Clone)]
pub enum Request {
    /// Per-cell mismatch maps over a bounding box
    Map(MapRequest),
    /// Reference pressure/altitude timeseries at a point
    Timeseries(TimeseriesRequest),
    /// Elevation percentiles along a path
    ElevationPath(ElevationPathRequest),
    /// Reanalysis variables along a path
    VariablePath(VariablePathRequest),
}

/// Map-mode response data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapData {
    /// Artifact format rendered by the delivery collaborator
    pub format: &'static str,
    /// Labels in order of first appearance
    pub labels: Vec<String>,
    /// One raster artifact descriptor per label
    pub rasters: Vec<RasterDescriptor>,
    /// Cell edge length in degrees
    pub resolution: f64,
    /// Raster size as `(width, height)`
    pub size: (usize, usize),
    /// Spatial domain
    pub bbox: BoundingBox,
    /// Whether the mask band is present
    pub include_mask: bool,
    /// Pruning threshold that was applied
    pub mask_threshold: f64,
}

/// Timeseries-mode response data (one CSV artifact).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesData {
    /// Artifact format
    pub format: &'static str,
    /// CSV column names in order
    pub columns: Vec<&'static str>,
    /// Effective (matched) reference timestamps
    pub time: Vec<i64>,
    /// Reference pressure per timestamp [Pa], NaN where uncovered
    pub pressure: Vec<f64>,
    /// Altitude per timestamp, present only for explicit-series requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<Vec<f64>>,
    /// Query longitude actually used (possibly relocated to land)
    pub lon: f64,
    /// Query latitude actually used
    pub lat: f64,
    /// Distance moved from the requested point to land [m]
    pub dist_inter: f64,
    /// Delivery URL, filled in by the collaborator
    pub url: Option<String>,
}

/// Elevation-path response data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationPathData {
    /// Cumulative distance per resampled point [m]
    pub distance: Vec<f64>,
    /// Longitude per resampled point
    pub lon: Vec<f64>,
    /// Latitude per resampled point
    pub lat: Vec<f64>,
    /// Nearest original station per resampled point
    pub step_id: Vec<usize>,
    /// Elevation arrays keyed by percentile (`p10`, `p50`, ...)
    pub percentile_data: BTreeMap<String, Vec<f64>>,
}

/// Variable-path response data.
#[derive(Debug, Clone, Serialize)]
pub struct VariablePathData {
    /// Effective (matched) reference timestamps
    pub time: Vec<i64>,
    /// Altitude per station, present when pressure was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<Vec<f64>>,
    /// One array per requested variable, keyed by variable name
    #[serde(flatten)]
    pub variables: BTreeMap<String, Vec<f64>>,
}

/// Data payload of a successful response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Map mode
    Map(MapData),
    /// Timeseries mode
    Timeseries(TimeseriesData),
    /// Elevation-path mode
    ElevationPath(ElevationPathData),
    /// Variable-path mode
    VariablePath(VariablePathData),
}

/// Response envelope shared by all modes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    /// Successful computation
    Success {
        /// Opaque task identifier for caller-side correlation
        #[serde(rename = "taskID")]
        task_id: i64,
        /// Wall time spent on the request, seconds
        #[serde(rename = "elapsedSeconds")]
        elapsed_seconds: f64,
        /// Mode-specific payload
        data: ResponseData,
    },
    /// Failed computation
    Error {
        /// Opaque task identifier for caller-side correlation
        #[serde(rename = "taskID")]
        task_id: i64,
        /// What went wrong
        #[serde(rename = "errorMessage")]
        error_message: String,
        /// Remediation advice
        advice: String,
    },
}

impl Response {
    /// Task identifier of either envelope form.
    pub fn task_id(&self) -> i64 {
        match self {
            Response::Success { task_id, .. } | Response::Error { task_id, .. } => *task_id,
        }
    }

    /// Whether this is a success envelope.
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}

/// Map-key for a percentile column (`10.0` becomes `p10`).
pub(crate) fn percentile_key(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("p{}", p as i64)
    } else {
        format!("p{p}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_request_json_defaults() {
        let req: MapRequest = serde_json::from_str(
            r#"{"W": -18, "S": 4, "E": 16, "N": 51,
                "time": [1572075000, 1572076800, 1572078600],
                "pressure": [97766, 97800, 97833],
                "label": [1, 1, 1]}"#,
        )
        .unwrap();
        assert_eq!(req.scale, 10.0);
        assert_eq!(req.options, MapOptions::default());

        let (series, spec) = req.validate().unwrap();
        assert_eq!(series.groups().len(), 1);
        assert_eq!((spec.width, spec.height), (340, 470));
    }

    #[test]
    fn test_map_request_flattened_options() {
        let req: MapRequest = serde_json::from_str(
            r#"{"W": 0, "S": 0, "E": 1, "N": 1,
                "time": [0], "pressure": [101000], "label": ["a"],
                "maxSample": 50, "maskThreshold": 0.5, "includeMask": false}"#,
        )
        .unwrap();
        assert_eq!(req.options.max_sample, 50);
        assert_eq!(req.options.mask_threshold, 0.5);
        assert!(!req.options.include_mask);
    }

    #[test]
    fn test_timeseries_request_forms() {
        let range = TimeseriesRequest {
            lon: 6.0,
            lat: 46.0,
            time: None,
            pressure: None,
            start_time: Some(1_497_916_800),
            end_time: Some(1_500_667_800),
        };
        assert!(matches!(
            range.validate().unwrap(),
            TimeseriesInput::Range { .. }
        ));

        let inverted = TimeseriesRequest {
            end_time: Some(0),
            ..range.clone()
        };
        assert!(inverted.validate().is_err());

        let partial = TimeseriesRequest {
            time: Some(vec![0]),
            pressure: None,
            start_time: None,
            end_time: None,
            lon: 6.0,
            lat: 46.0,
        };
        assert!(partial.validate().is_err());
    }

    #[test]
    fn test_variable_path_length_checks() {
        let req = VariablePathRequest {
            lon: vec![8.0, 9.0],
            lat: vec![48.0, 47.0],
            time: vec![0, 3600],
            variable: vec!["u10".to_string()],
            pressure: Some(vec![101_000.0]),
            dataset: Dataset::Both,
            workers: 10,
        };
        assert!(req.validate().is_err());

        let ok = VariablePathRequest {
            pressure: Some(vec![101_000.0, 101_010.0]),
            ..req
        };
        assert_eq!(ok.validate().unwrap().len(), 2);
    }

    #[test]
    fn test_envelope_serialization() {
        let response = Response::Error {
            task_id: 1_572_075_000,
            error_message: "W is not a float number".to_string(),
            advice: "Double check the inputs.".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["taskID"], 1_572_075_000i64);
        assert_eq!(json["errorMessage"], "W is not a float number");
    }

    #[test]
    fn test_percentile_key_format() {
        assert_eq!(percentile_key(10.0), "p10");
        assert_eq!(percentile_key(97.5), "p97.5");
    }
}
