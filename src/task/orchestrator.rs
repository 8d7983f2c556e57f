//! Request dispatch, chunked fan-out, and envelope assembly.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;

use super::{
    percentile_key, ElevationPathData, ElevationPathRequest, MapData, MapRequest, Request,
    Response, ResponseData, TimeseriesData, TimeseriesInput, TimeseriesRequest, VariablePathData,
    VariablePathRequest,
};
use crate::access::{retry_once, ElevationAccessor, ReanalysisAccessor};
use crate::barometric;
use crate::error::{EngineError, Result};
use crate::mismatch::{MismatchEngine, MismatchRaster};
use crate::path::{elevation_along_path, extract_variables, VariableChunk};
use crate::temporal::{hourly_range, match_time};

/// Stateless per-request coordinator over injected accessors.
///
/// Each request is an independent unit of work; nothing is shared across
/// requests besides the read-only accessors.
pub struct Orchestrator<R, E> {
    reanalysis: R,
    elevation: E,
}

impl<R: ReanalysisAccessor, E: ElevationAccessor> Orchestrator<R, E> {
    /// Create an orchestrator over the given accessors.
    pub fn new(reanalysis: R, elevation: E) -> Self {
        Self {
            reanalysis,
            elevation,
        }
    }

    /// Run a request end to end and assemble the response envelope.
    ///
    /// Never panics on bad input; every failure becomes an error envelope
    /// carrying the task identifier and remediation advice.
    pub fn handle(&self, request: &Request) -> Response {
        let task_id = Utc::now().timestamp();
        let started = Instant::now();

        match self.dispatch(request) {
            Ok(data) => {
                let elapsed_seconds = started.elapsed().as_secs_f64();
                tracing::debug!(task_id, elapsed_seconds, "request complete");
                Response::Success {
                    task_id,
                    elapsed_seconds,
                    data,
                }
            }
            Err(err) => {
                tracing::warn!(task_id, error = %err, "request failed");
                Response::Error {
                    task_id,
                    error_message: err.to_string(),
                    advice: err.advice().to_string(),
                }
            }
        }
    }

    fn dispatch(&self, request: &Request) -> Result<ResponseData> {
        match request {
            Request::Map(req) => {
                let rasters = self.map(req)?;
                Ok(ResponseData::Map(map_data(req, &rasters)))
            }
            Request::Timeseries(req) => self.timeseries(req).map(ResponseData::Timeseries),
            Request::ElevationPath(req) => {
                self.elevation_path(req).map(ResponseData::ElevationPath)
            }
            Request::VariablePath(req) => self.variable_path(req).map(ResponseData::VariablePath),
        }
    }

    /// Map mode: one mismatch raster per label group.
    pub fn map(&self, request: &MapRequest) -> Result<Vec<MismatchRaster>> {
        let (series, spec) = request.validate()?;
        MismatchEngine::new(&self.reanalysis, &self.elevation).compute(
            &series,
            &spec,
            &request.options,
        )
    }

    /// Timeseries mode: reference pressure (and altitude) at one point.
    ///
    /// A point over open water is relocated to the nearest land cell
    /// before any lookup; the relocation distance is reported as
    /// `dist_inter`.
    pub fn timeseries(&self, request: &TimeseriesRequest) -> Result<TimeseriesData> {
        let input = request.validate()?;

        let on_land = retry_once(|| self.elevation.is_land(request.lon, request.lat))?;
        let (lon, lat, dist_inter) = if on_land {
            (request.lon, request.lat, 0.0)
        } else {
            retry_once(|| self.elevation.nearest_land(request.lon, request.lat))?.ok_or_else(
                || {
                    EngineError::computation(format!(
                        "no land within search radius of ({}, {})",
                        request.lon, request.lat
                    ))
                },
            )?
        };
        if dist_inter > 0.0 {
            tracing::debug!(lon, lat, dist_inter, "relocated water point to nearest land");
        }

        match input {
            TimeseriesInput::Explicit(series) => {
                let mut time = Vec::with_capacity(series.len());
                let mut pressure = Vec::with_capacity(series.len());
                let mut altitude = Vec::with_capacity(series.len());

                for (&t, &p) in series.time.iter().zip(series.pressure.iter()) {
                    match retry_once(|| self.reanalysis.sample_at(lon, lat, t))? {
                        Some(sample) => {
                            time.push(sample.time);
                            pressure.push(sample.pressure);
                            altitude.push(barometric::altitude(
                                p,
                                sample.surface_pressure,
                                sample.temperature,
                            )?);
                        }
                        None => {
                            // Matched hour outside the dataset: no-data row
                            time.push(match_time(t).matched);
                            pressure.push(f64::NAN);
                            altitude.push(f64::NAN);
                        }
                    }
                }

                Ok(TimeseriesData {
                    format: "csv",
                    columns: vec!["time", "pressure", "altitude"],
                    time,
                    pressure,
                    altitude: Some(altitude),
                    lon,
                    lat,
                    dist_inter,
                    url: None,
                })
            }
            TimeseriesInput::Range { start, end } => {
                let times = hourly_range(start, end)?;
                let mut time = Vec::with_capacity(times.len());
                let mut pressure = Vec::with_capacity(times.len());

                for &t in &times {
                    match retry_once(|| self.reanalysis.sample_at(lon, lat, t))? {
                        Some(sample) => {
                            time.push(sample.time);
                            pressure.push(sample.pressure);
                        }
                        None => {
                            time.push(match_time(t).matched);
                            pressure.push(f64::NAN);
                        }
                    }
                }

                Ok(TimeseriesData {
                    format: "csv",
                    columns: vec!["time", "pressure"],
                    time,
                    pressure,
                    altitude: None,
                    lon,
                    lat,
                    dist_inter,
                    url: None,
                })
            }
        }
    }

    /// Elevation-path mode: ground-elevation percentiles along a path.
    pub fn elevation_path(&self, request: &ElevationPathRequest) -> Result<ElevationPathData> {
        let vertices = request.validate()?;
        let path = elevation_along_path(
            &self.elevation,
            &vertices,
            request.scale,
            request.sampling_scale,
            &request.percentile,
        )?;

        let mut percentile_data = BTreeMap::new();
        for (p, values) in path.percentiles.iter().zip(path.elevation) {
            percentile_data.insert(percentile_key(*p), values);
        }

        Ok(ElevationPathData {
            distance: path.points.iter().map(|pt| pt.distance).collect(),
            lon: path.points.iter().map(|pt| pt.lon).collect(),
            lat: path.points.iter().map(|pt| pt.lat).collect(),
            step_id: path.points.iter().map(|pt| pt.step_id).collect(),
            percentile_data,
        })
    }

    /// Variable-path mode: chunked concurrent extraction, merged in order.
    ///
    /// Chunking only bounds the per-call payload against the external
    /// source; the merged output is identical to an unchunked run. Any
    /// chunk failure fails the whole request.
    pub fn variable_path(&self, request: &VariablePathRequest) -> Result<VariablePathData> {
        let points = request.validate()?;

        let n = points.len();
        let workers = request.workers.min(n);
        let chunk_size = n.div_ceil(workers);
        let ranges: Vec<std::ops::Range<usize>> = (0..workers)
            .map(|i| i * chunk_size..((i + 1) * chunk_size).min(n))
            .filter(|r| !r.is_empty())
            .collect();

        tracing::debug!(stations = n, chunks = ranges.len(), "dispatching variable extraction");

        // Each chunk owns its slot in the output vector; fan-in merges by
        // chunk index, never by completion order.
        let chunks: Vec<Result<VariableChunk>> = ranges
            .into_par_iter()
            .map(|range| {
                extract_variables(
                    &self.reanalysis,
                    &points[range.clone()],
                    &request.time[range.clone()],
                    request.pressure.as_deref().map(|p| &p[range.clone()]),
                    &request.variable,
                    request.dataset,
                )
            })
            .collect();

        let mut data = VariablePathData {
            time: Vec::with_capacity(n),
            altitude: request.pressure.as_ref().map(|_| Vec::with_capacity(n)),
            variables: request
                .variable
                .iter()
                .map(|name| (name.clone(), Vec::with_capacity(n)))
                .collect(),
        };

        for chunk in chunks {
            let chunk = chunk?;
            data.time.extend(chunk.time);
            if let (Some(merged), Some(part)) = (data.altitude.as_mut(), chunk.altitude) {
                merged.extend(part);
            }
            for (name, column) in request.variable.iter().zip(chunk.variables) {
                data.variables
                    .get_mut(name)
                    .expect("column created above")
                    .extend(column);
            }
        }

        Ok(data)
    }
}

/// Build the map-mode envelope payload from the computed rasters.
fn map_data(request: &MapRequest, rasters: &[MismatchRaster]) -> MapData {
    let spec = rasters
        .first()
        .map(|r| r.spec)
        .expect("a validated series has at least one label group");

    MapData {
        format: "GEOTIFF",
        labels: rasters.iter().map(|r| r.label.to_string()).collect(),
        rasters: rasters.iter().map(|r| r.descriptor()).collect(),
        resolution: spec.resolution(),
        size: (spec.width, spec.height),
        bbox: spec.bbox,
        include_mask: request.options.include_mask,
        mask_threshold: request.options.mask_threshold,
    }
}
