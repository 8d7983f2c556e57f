//! Data-access interfaces to the external reanalysis and elevation sources.
//!
//! The engine never talks to a network or a file format directly; it
//! consumes these two traits. Production embeddings implement them against
//! the remote data provider, tests substitute the in-memory grids from
//! [`grid`]. Implementations are responsible for bounding their own call
//! timeouts; the engine adds a single content-agnostic retry on transient
//! failure via [`retry_once`].

pub mod grid;

pub use grid::{ElevationGrid, GriddedReanalysis};

use std::str::FromStr;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Backoff before the single retry of a failed accessor call.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Reanalysis values for one location at the nearest available hour.
///
/// Produced by the external accessor, consumed read-only by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceSample {
    /// Effective (matched) reference timestamp, unix seconds, whole hour
    pub time: i64,
    /// Reference pressure reported back to callers [Pa]; equals the
    /// surface pressure for the land dataset
    pub pressure: f64,
    /// 2 m air temperature [K]
    pub temperature: f64,
    /// Surface pressure [Pa]
    pub surface_pressure: f64,
}

/// Which reanalysis collection variable lookups read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dataset {
    /// Land-only collection (finer resolution, masked over open water)
    Land,
    /// Single-levels collection (global coverage, coarser)
    SingleLevels,
    /// Merged view: land values where present, single-levels elsewhere
    #[default]
    Both,
}

impl FromStr for Dataset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "land" => Ok(Dataset::Land),
            "single-levels" => Ok(Dataset::SingleLevels),
            "both" => Ok(Dataset::Both),
            other => Err(EngineError::validation(format!(
                "unknown dataset '{other}', expected land, single-levels, or both"
            ))),
        }
    }
}

/// Read-only access to the gridded hourly reanalysis source.
///
/// All lookups snap the requested time to the dataset's hourly grid and
/// return `None` (not an error) where the dataset has no coverage, such as
/// over open water for the land collection.
pub trait ReanalysisAccessor: Sync {
    /// Surface pressure and temperature at the nearest hour to `time`.
    fn sample_at(&self, lon: f64, lat: f64, time: i64) -> Result<Option<ReferenceSample>>;

    /// A named atmospheric variable at the nearest hour to `time`.
    fn variable_at(
        &self,
        name: &str,
        lon: f64,
        lat: f64,
        time: i64,
        dataset: Dataset,
    ) -> Result<Option<f64>>;

    /// Whether the land collection covers this location at all.
    ///
    /// Cells without coverage become no-data sentinels in map mode.
    fn has_coverage(&self, lon: f64, lat: f64) -> Result<bool>;
}

/// Min/max ground elevation over a cell-sized neighborhood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationBounds {
    /// Lowest ground elevation in the neighborhood [m]
    pub min: f64,
    /// Highest ground elevation in the neighborhood [m]
    pub max: f64,
}

/// Read-only access to the ground-elevation / land-mask source.
pub trait ElevationAccessor: Sync {
    /// Elevation bounds over a square neighborhood of `resolution_deg`
    /// centered on the point, or `None` where the source has no land data.
    fn bounds_at(&self, lon: f64, lat: f64, resolution_deg: f64) -> Result<Option<ElevationBounds>>;

    /// Requested percentiles of ground elevation over a neighborhood of
    /// `scale_deg`, in the same order as `percentiles`. Water cells inside
    /// the neighborhood contribute elevation 0.
    fn percentiles_at(
        &self,
        lon: f64,
        lat: f64,
        scale_deg: f64,
        percentiles: &[f64],
    ) -> Result<Vec<f64>>;

    /// Land/water classification for a point.
    fn is_land(&self, lon: f64, lat: f64) -> Result<bool>;

    /// Nearest land point to a water location, as `(lon, lat, distance_m)`.
    ///
    /// Returns `None` when no land exists within the source's search
    /// radius.
    fn nearest_land(&self, lon: f64, lat: f64) -> Result<Option<(f64, f64, f64)>>;
}

/// Run an accessor operation with a single retry on transient failure.
///
/// Validation and computation errors pass through untouched. A
/// [`EngineError::DataSource`] failure is retried once after a short
/// backoff; a second failure is surfaced with `retried` set.
pub fn retry_once<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(err) if err.is_retryable() => {
            tracing::warn!(error = %err, "data source call failed, retrying once");
            thread::sleep(RETRY_BACKOFF);
            op().map_err(|second| match second {
                EngineError::DataSource { message, .. } => {
                    EngineError::DataSource { message, retried: true }
                }
                other => other,
            })
        }
        other => other,
    }
}
