//! In-memory gridded backends for the data-access traits.
//!
//! Both backends store a regular lat/lon grid with row 0 at the northern
//! edge and perform nearest-cell lookup. They serve embeddings that have
//! already staged reference data locally, and they are the fakes the test
//! suite injects through the accessor traits.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use super::{Dataset, ElevationAccessor, ElevationBounds, ReanalysisAccessor, ReferenceSample};
use crate::error::{EngineError, Result};
use crate::geo::{haversine_distance, percentile, BoundingBox};
use crate::temporal::{match_time, STEP_SECONDS};

/// Search radius for nearest-land relocation, in meters.
const NEAREST_LAND_RADIUS: f64 = 1_000_000.0;

/// Hourly reanalysis fields on a regular lat/lon grid.
///
/// Storage is row-major per hour: `hour * height * width + row * width +
/// col`, row 0 at the northern edge.
#[derive(Debug, Clone)]
pub struct GriddedReanalysis {
    bbox: BoundingBox,
    width: usize,
    height: usize,
    /// First available hour (unix seconds, whole hour)
    start_time: i64,
    hours: usize,
    surface_pressure: Vec<f64>,
    temperature_2m: Vec<f64>,
    /// Extra named variables, same layout as the built-in fields
    variables: HashMap<String, Vec<f64>>,
    /// Land-collection coverage per cell (height * width)
    coverage: Vec<bool>,
}

impl GriddedReanalysis {
    /// Create a grid from per-hour surface pressure and temperature fields.
    ///
    /// `surface_pressure` and `temperature_2m` must both hold
    /// `hours * width * height` values for a whole number of hours.
    pub fn new(
        bbox: BoundingBox,
        width: usize,
        height: usize,
        start_time: i64,
        surface_pressure: Vec<f64>,
        temperature_2m: Vec<f64>,
    ) -> Result<Self> {
        let cells = width * height;
        if cells == 0 {
            return Err(EngineError::validation("grid must have at least one cell"));
        }
        if surface_pressure.len() != temperature_2m.len()
            || surface_pressure.is_empty()
            || surface_pressure.len() % cells != 0
        {
            return Err(EngineError::validation(
                "field length must be a whole number of hours times the cell count",
            ));
        }
        if start_time.rem_euclid(STEP_SECONDS) != 0 {
            return Err(EngineError::validation(
                "reanalysis start time must fall on a whole hour",
            ));
        }
        let hours = surface_pressure.len() / cells;
        Ok(Self {
            bbox,
            width,
            height,
            start_time,
            hours,
            surface_pressure,
            temperature_2m,
            variables: HashMap::new(),
            coverage: vec![true; cells],
        })
    }

    /// Create a grid with constant fields, convenient for tests.
    pub fn uniform(
        bbox: BoundingBox,
        width: usize,
        height: usize,
        start_time: i64,
        hours: usize,
        surface_pressure: f64,
        temperature_2m: f64,
    ) -> Result<Self> {
        let n = hours * width * height;
        Self::new(
            bbox,
            width,
            height,
            start_time,
            vec![surface_pressure; n],
            vec![temperature_2m; n],
        )
    }

    /// Attach a named variable field (`hours * width * height` values).
    pub fn with_variable(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.hours * self.width * self.height {
            return Err(EngineError::validation(
                "variable field length must match the grid layout",
            ));
        }
        self.variables.insert(name.into(), values);
        Ok(self)
    }

    /// Replace the land-coverage mask (`width * height` flags, row 0 north).
    pub fn with_coverage(mut self, coverage: Vec<bool>) -> Result<Self> {
        if coverage.len() != self.width * self.height {
            return Err(EngineError::validation(
                "coverage mask length must match the cell count",
            ));
        }
        self.coverage = coverage;
        Ok(self)
    }

    /// Overwrite the surface pressure at one cell for one hour.
    pub fn set_surface_pressure(&mut self, hour: usize, row: usize, col: usize, value: f64) {
        let idx = hour * self.height * self.width + row * self.width + col;
        self.surface_pressure[idx] = value;
    }

    fn cell(&self, lon: f64, lat: f64) -> Option<usize> {
        if !self.bbox.contains(lon, lat) {
            return None;
        }
        let col = ((lon - self.bbox.west) / self.bbox.width() * self.width as f64) as usize;
        let row = ((self.bbox.north - lat) / self.bbox.height() * self.height as f64) as usize;
        let col = col.min(self.width - 1);
        let row = row.min(self.height - 1);
        Some(row * self.width + col)
    }

    fn hour(&self, time: i64) -> Option<usize> {
        let matched = match_time(time).matched;
        if matched < self.start_time {
            return None;
        }
        let idx = ((matched - self.start_time) / STEP_SECONDS) as usize;
        (idx < self.hours).then_some(idx)
    }
}

impl ReanalysisAccessor for GriddedReanalysis {
    fn sample_at(&self, lon: f64, lat: f64, time: i64) -> Result<Option<ReferenceSample>> {
        let Some(cell) = self.cell(lon, lat) else {
            return Ok(None);
        };
        if !self.coverage[cell] {
            return Ok(None);
        }
        let Some(hour) = self.hour(time) else {
            return Ok(None);
        };
        let idx = hour * self.height * self.width + cell;
        let surface_pressure = self.surface_pressure[idx];
        Ok(Some(ReferenceSample {
            time: match_time(time).matched,
            pressure: surface_pressure,
            temperature: self.temperature_2m[idx],
            surface_pressure,
        }))
    }

    fn variable_at(
        &self,
        name: &str,
        lon: f64,
        lat: f64,
        time: i64,
        dataset: Dataset,
    ) -> Result<Option<f64>> {
        let Some(cell) = self.cell(lon, lat) else {
            return Ok(None);
        };
        // The land collection is masked over open water; the merged and
        // single-levels views still report a value there.
        if dataset == Dataset::Land && !self.coverage[cell] {
            return Ok(None);
        }
        let Some(hour) = self.hour(time) else {
            return Ok(None);
        };
        let idx = hour * self.height * self.width + cell;
        let value = match name {
            "surface_pressure" => Some(self.surface_pressure[idx]),
            "temperature_2m" => Some(self.temperature_2m[idx]),
            other => self.variables.get(other).map(|field| field[idx]),
        };
        match value {
            Some(v) => Ok(Some(v)),
            None => Err(EngineError::validation(format!(
                "unknown reanalysis variable '{name}'"
            ))),
        }
    }

    fn has_coverage(&self, lon: f64, lat: f64) -> Result<bool> {
        Ok(self.cell(lon, lat).map(|c| self.coverage[c]).unwrap_or(false))
    }
}

/// Error type for GeoTIFF elevation loading.
#[derive(Debug, Error)]
pub enum GeoTiffError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error
    #[error("TIFF error: {0}")]
    Tiff(String),

    /// Missing or invalid geotransform tags
    #[error("missing geotransform: {0}")]
    MissingGeotransform(String),
}

impl From<tiff::TiffError> for GeoTiffError {
    fn from(e: tiff::TiffError) -> Self {
        GeoTiffError::Tiff(e.to_string())
    }
}

/// Ground elevation on a regular lat/lon grid with a land mask.
///
/// Cells holding the nodata value (or NaN) are water. Elevation queries
/// aggregate over neighborhoods of grid cells, so the grid should be
/// stored at a resolution at least as fine as the finest query scale.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    bbox: BoundingBox,
    width: usize,
    height: usize,
    elevation: Vec<f32>,
    nodata: f32,
}

impl ElevationGrid {
    /// Create a grid from row-major elevation values (row 0 north).
    pub fn new(bbox: BoundingBox, width: usize, height: usize, elevation: Vec<f32>) -> Result<Self> {
        if elevation.len() != width * height || elevation.is_empty() {
            return Err(EngineError::validation(
                "elevation field length must equal width * height",
            ));
        }
        Ok(Self {
            bbox,
            width,
            height,
            elevation,
            nodata: -9999.0,
        })
    }

    /// Load a single-band elevation GeoTIFF.
    ///
    /// The geotransform is read from the ModelPixelScale (33550) and
    /// ModelTiepoint (33922) tags; `bbox_hint` covers files that lack them.
    pub fn from_geotiff<P: AsRef<Path>>(
        path: P,
        bbox_hint: Option<BoundingBox>,
    ) -> std::result::Result<Self, GeoTiffError> {
        let file = File::open(&path)?;
        let mut decoder = Decoder::new(file)?;
        let (width, height) = decoder.dimensions()?;

        let pixel_scale = decoder.get_tag_f64_vec(Tag::Unknown(33550)).ok();
        let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(33922)).ok();

        let bbox = match (pixel_scale, tiepoint) {
            (Some(scale), Some(tie)) if tie.len() >= 6 && scale.len() >= 2 => {
                let west = tie[3];
                let north = tie[4];
                let east = west + width as f64 * scale[0];
                let south = north - height as f64 * scale[1];
                BoundingBox::new(west, south, east, north)
                    .map_err(|e| GeoTiffError::MissingGeotransform(e.to_string()))?
            }
            _ => bbox_hint.ok_or_else(|| {
                GeoTiffError::MissingGeotransform(
                    "no geotransform tags and no bbox hint provided".to_string(),
                )
            })?,
        };

        let elevation: Vec<f32> = match decoder.read_image()? {
            DecodingResult::F32(data) => data,
            DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        };

        Self::new(bbox, width as usize, height as usize, elevation)
            .map_err(|e| GeoTiffError::Tiff(e.to_string()))
    }

    /// Set the nodata (water) value.
    pub fn set_nodata(&mut self, nodata: f32) {
        self.nodata = nodata;
    }

    fn is_valid(&self, value: f32) -> bool {
        value.is_finite() && (value - self.nodata).abs() > 0.01
    }

    fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let lon = self.bbox.west + (col as f64 + 0.5) / self.width as f64 * self.bbox.width();
        let lat = self.bbox.north - (row as f64 + 0.5) / self.height as f64 * self.bbox.height();
        (lon, lat)
    }

    /// Elevation at the nearest cell, or `None` over water / outside.
    pub fn value_at(&self, lon: f64, lat: f64) -> Option<f64> {
        if !self.bbox.contains(lon, lat) {
            return None;
        }
        let col =
            (((lon - self.bbox.west) / self.bbox.width() * self.width as f64) as usize).min(self.width - 1);
        let row = (((self.bbox.north - lat) / self.bbox.height() * self.height as f64) as usize)
            .min(self.height - 1);
        let value = self.elevation[row * self.width + col];
        self.is_valid(value).then_some(value as f64)
    }

    /// All cell values in a square neighborhood of `span_deg` around the
    /// point. Water cells contribute `None`; a window that falls entirely
    /// outside the grid yields an empty neighborhood.
    fn neighborhood(&self, lon: f64, lat: f64, span_deg: f64) -> Vec<Option<f64>> {
        let half = span_deg / 2.0;
        let cell_w = self.bbox.width() / self.width as f64;
        let cell_h = self.bbox.height() / self.height as f64;

        // Signed cell positions; clamping to the grid happens only after
        // the fully-outside cases are ruled out on every side.
        let col_lo = ((lon - half - self.bbox.west) / cell_w).floor();
        let col_hi = ((lon + half - self.bbox.west) / cell_w).ceil().max(col_lo + 1.0);
        let row_lo = ((self.bbox.north - lat - half) / cell_h).floor();
        let row_hi = ((self.bbox.north - lat + half) / cell_h).ceil().max(row_lo + 1.0);

        if col_hi <= 0.0
            || row_hi <= 0.0
            || col_lo >= self.width as f64
            || row_lo >= self.height as f64
        {
            return Vec::new();
        }

        let col_min = col_lo.max(0.0) as usize;
        let col_max = (col_hi as usize).min(self.width);
        let row_min = row_lo.max(0.0) as usize;
        let row_max = (row_hi as usize).min(self.height);

        let mut values = Vec::new();
        for row in row_min..row_max {
            for col in col_min..col_max {
                let (clon, clat) = self.cell_center(row, col);
                if !self.bbox.contains(clon, clat) {
                    continue;
                }
                let v = self.elevation[row * self.width + col];
                values.push(self.is_valid(v).then_some(v as f64));
            }
        }
        values
    }
}

impl ElevationAccessor for ElevationGrid {
    fn bounds_at(&self, lon: f64, lat: f64, resolution_deg: f64) -> Result<Option<ElevationBounds>> {
        let valid: Vec<f64> = self
            .neighborhood(lon, lat, resolution_deg)
            .into_iter()
            .flatten()
            .collect();
        if valid.is_empty() {
            return Ok(None);
        }
        let min = valid.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = valid.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Ok(Some(ElevationBounds { min, max }))
    }

    fn percentiles_at(
        &self,
        lon: f64,
        lat: f64,
        scale_deg: f64,
        percentiles: &[f64],
    ) -> Result<Vec<f64>> {
        // Water cells count as elevation zero in the percentile reduction.
        let values: Vec<f64> = self
            .neighborhood(lon, lat, scale_deg)
            .into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();
        if values.is_empty() {
            return Ok(vec![0.0; percentiles.len()]);
        }
        Ok(percentiles.iter().map(|&p| percentile(&values, p)).collect())
    }

    fn is_land(&self, lon: f64, lat: f64) -> Result<bool> {
        Ok(self.value_at(lon, lat).is_some())
    }

    fn nearest_land(&self, lon: f64, lat: f64) -> Result<Option<(f64, f64, f64)>> {
        // Exhaustive scan over land cells; acceptable for staged grids.
        let mut best: Option<(f64, f64, f64)> = None;
        for row in 0..self.height {
            for col in 0..self.width {
                if !self.is_valid(self.elevation[row * self.width + col]) {
                    continue;
                }
                let (clon, clat) = self.cell_center(row, col);
                let dist = haversine_distance(lon, lat, clon, clat);
                if best.map(|(_, _, d)| dist < d).unwrap_or(true) {
                    best = Some((clon, clat, dist));
                }
            }
        }
        Ok(best.filter(|&(_, _, d)| d <= NEAREST_LAND_RADIUS))
    }
}
