//! # geopressure-core
//!
//! Computation engine for locating pressure-logging geolocators against a
//! gridded hourly atmospheric reanalysis dataset.
//!
//! This crate provides the core building blocks of the matching service:
//! - Geodesy utilities (bounding boxes, haversine distance, statistics)
//! - Barometric pressure-to-altitude conversion
//! - Temporal alignment to the reanalysis hourly grid
//! - Per-cell mismatch maps (mean-removed MSE + ground-consistency mask)
//! - Path resampling with elevation/variable extraction
//! - Request validation, chunked fan-out, and response envelopes
//!
//! Everything outside the computation (HTTP transport, credentials, raster
//! byte encoding, delivery) is an external collaborator reached through
//! the [`access`] traits.
//!
//! # Example
//!
//! ```ignore
//! use geopressure_core::{Orchestrator, Request, MapRequest};
//!
//! let orchestrator = Orchestrator::new(reanalysis, elevation);
//! let response = orchestrator.handle(&Request::Map(map_request));
//! assert!(response.is_success());
//! ```

pub mod access;
pub mod barometric;
pub mod error;
pub mod geo;
pub mod mismatch;
pub mod path;
pub mod series;
pub mod task;
pub mod temporal;

pub use access::{
    Dataset, ElevationAccessor, ElevationBounds, ElevationGrid, GriddedReanalysis,
    ReanalysisAccessor, ReferenceSample,
};
pub use error::{EngineError, Result};
pub use self::geo::{haversine_distance, BoundingBox, METERS_PER_DEGREE};
pub use mismatch::{
    GridSpec, MapOptions, MismatchEngine, MismatchRaster, RasterDescriptor, NO_DATA, PRUNED,
};
pub use path::{resample_path, ElevationPath, PathPoint};
pub use series::{Label, LabeledTimeseries, PressureSeries};
pub use task::{
    ElevationPathRequest, MapRequest, Orchestrator, Request, Response, ResponseData,
    TimeseriesRequest, VariablePathRequest,
};
pub use temporal::{hourly_range, match_time, MatchedTime, STEP_SECONDS};
