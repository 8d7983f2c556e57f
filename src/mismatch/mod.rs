//! Per-cell mismatch maps between a pressure timeseries and the
//! reanalysis grid.
//!
//! Each label group of the input series produces one raster over the
//! requested bounding box with a mean-removed MSE band and an optional
//! ground-consistency mask band. No-data cells (open water, missing
//! reference coverage) carry [`NO_DATA`]; cells pruned by the mask
//! threshold carry [`PRUNED`] in the MSE band.

mod engine;

pub use engine::MismatchEngine;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::geo::BoundingBox;
use crate::series::Label;

/// Sentinel for cells without reference coverage (open water).
pub const NO_DATA: f64 = -2.0;

/// Sentinel for cells pruned below the mask threshold.
pub const PRUNED: f64 = -1.0;

/// Native resolution limit of the reference dataset, in pixels per degree.
pub const MAX_SCALE: f64 = 10.0;

/// Raster geometry derived from a bounding box and a scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Spatial domain of the raster
    pub bbox: BoundingBox,
    /// Pixels per degree
    pub scale: f64,
    /// Raster width in cells
    pub width: usize,
    /// Raster height in cells
    pub height: usize,
}

impl GridSpec {
    /// Derive the raster geometry for a bounding box at `scale` pixels per
    /// degree.
    ///
    /// `(E-W)*scale` and `(N-S)*scale` must be integral within 1e-3, and
    /// `scale` must not exceed the dataset's native resolution
    /// ([`MAX_SCALE`]) to avoid spurious interpolation.
    pub fn new(bbox: BoundingBox, scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(EngineError::validation("scale should be a positive number"));
        }
        if scale > MAX_SCALE {
            return Err(EngineError::validation(format!(
                "scale {scale} exceeds the native dataset resolution of {MAX_SCALE} pixels per degree"
            )));
        }

        let size_lon = bbox.width() * scale;
        let size_lat = bbox.height() * scale;
        if (size_lon - size_lon.round()).abs() > 1e-3 {
            return Err(EngineError::validation("(E-W)*scale should be an integer"));
        }
        if (size_lat - size_lat.round()).abs() > 1e-3 {
            return Err(EngineError::validation("(N-S)*scale should be an integer"));
        }

        Ok(Self {
            bbox,
            scale,
            width: size_lon.round() as usize,
            height: size_lat.round() as usize,
        })
    }

    /// Cell edge length in degrees.
    pub fn resolution(&self) -> f64 {
        1.0 / self.scale
    }

    /// Number of cells in the raster.
    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Center coordinates `(lon, lat)` of a cell; row 0 is the northern
    /// edge.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        let res = self.resolution();
        (
            self.bbox.west + (col as f64 + 0.5) * res,
            self.bbox.north - (row as f64 + 0.5) * res,
        )
    }
}

/// Tunables for the mismatch computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapOptions {
    /// Upper bound on samples evaluated per label group
    pub max_sample: usize,
    /// Ground-elevation tolerance for the mask, in meters
    pub margin: f64,
    /// Whether the mask band is included in the output
    pub include_mask: bool,
    /// Prune cells whose mask falls below this fraction; 0 disables pruning
    pub mask_threshold: f64,
    /// Fixed RNG seed for the subsample; unseeded (non-deterministic) when
    /// unset
    pub seed: Option<u64>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            max_sample: 250,
            margin: 30.0,
            include_mask: true,
            mask_threshold: 0.0,
            seed: None,
        }
    }
}

impl MapOptions {
    /// Set the per-group sample bound.
    pub fn with_max_sample(mut self, max_sample: usize) -> Self {
        self.max_sample = max_sample;
        self
    }

    /// Set the elevation margin in meters.
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Enable or disable the mask band.
    pub fn with_include_mask(mut self, include_mask: bool) -> Self {
        self.include_mask = include_mask;
        self
    }

    /// Set the mask pruning threshold.
    pub fn with_mask_threshold(mut self, mask_threshold: f64) -> Self {
        self.mask_threshold = mask_threshold;
        self
    }

    /// Fix the subsample RNG seed for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate option ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_sample == 0 {
            return Err(EngineError::validation("maxSample must be at least 1"));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(EngineError::validation("margin must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.mask_threshold) {
            return Err(EngineError::validation("maskThreshold must be within [0, 1]"));
        }
        Ok(())
    }
}

/// One computed raster for one label group.
///
/// Band values are row-major with row 0 at the northern edge. Immutable
/// once computed; lives for one response.
#[derive(Debug, Clone)]
pub struct MismatchRaster {
    /// Label group this raster belongs to
    pub label: Label,
    /// Raster geometry
    pub spec: GridSpec,
    /// Band 1: mean-removed MSE per cell [Pa²], or a sentinel
    pub mse: Vec<f64>,
    /// Band 2: ground-consistency fraction per cell, when requested
    pub mask: Option<Vec<f64>>,
}

impl MismatchRaster {
    /// Number of bands in the artifact.
    pub fn bands(&self) -> usize {
        if self.mask.is_some() { 2 } else { 1 }
    }

    /// Artifact descriptor handed to the rendering/delivery collaborator.
    pub fn descriptor(&self) -> RasterDescriptor {
        RasterDescriptor {
            label: self.label.to_string(),
            url: None,
            bbox: self.spec.bbox,
            resolution: self.spec.resolution(),
            size: (self.spec.width, self.spec.height),
            bands: self.bands(),
        }
    }
}

/// Descriptor of one raster artifact for the response envelope.
///
/// The `url` slot is filled by the external delivery collaborator once the
/// raster bytes have been rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterDescriptor {
    /// Label group
    pub label: String,
    /// Delivery URL, filled in by the collaborator
    pub url: Option<String>,
    /// Spatial domain
    pub bbox: BoundingBox,
    /// Cell edge length in degrees
    pub resolution: f64,
    /// Raster size as `(width, height)` in cells
    pub size: (usize, usize),
    /// Band count: 1 (MSE) or 2 (MSE + mask)
    pub bands: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_spec_documented_example() {
        let bbox = BoundingBox::new(-18.0, 4.0, 16.0, 51.0).unwrap();
        let spec = GridSpec::new(bbox, 10.0).unwrap();
        assert_eq!((spec.width, spec.height), (340, 470));
        assert!((spec.resolution() - 0.1).abs() < 1e-12);
        assert_eq!(spec.cells(), 340 * 470);
    }

    #[test]
    fn test_grid_spec_rejects_fractional_size() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.05, 1.0).unwrap();
        assert!(GridSpec::new(bbox, 10.0).is_err());
    }

    #[test]
    fn test_grid_spec_rejects_excess_scale() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(GridSpec::new(bbox, 20.0).is_err());
        assert!(GridSpec::new(bbox, 0.0).is_err());
    }

    #[test]
    fn test_cell_center_orientation() {
        let bbox = BoundingBox::new(0.0, 0.0, 2.0, 2.0).unwrap();
        let spec = GridSpec::new(bbox, 1.0).unwrap();
        // Row 0 is north
        assert_eq!(spec.cell_center(0, 0), (0.5, 1.5));
        assert_eq!(spec.cell_center(1, 1), (1.5, 0.5));
    }

    #[test]
    fn test_options_defaults() {
        let opts = MapOptions::default();
        assert_eq!(opts.max_sample, 250);
        assert_eq!(opts.margin, 30.0);
        assert!(opts.include_mask);
        assert_eq!(opts.mask_threshold, 0.0);
        assert!(opts.seed.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        assert!(MapOptions::default().with_mask_threshold(1.5).validate().is_err());
        assert!(MapOptions::default().with_max_sample(0).validate().is_err());
        assert!(MapOptions::default().with_margin(-1.0).validate().is_err());
    }

    #[test]
    fn test_descriptor_band_count() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let spec = GridSpec::new(bbox, 1.0).unwrap();
        let raster = MismatchRaster {
            label: Label::from(1),
            spec,
            mse: vec![NO_DATA],
            mask: None,
        };
        assert_eq!(raster.descriptor().bands, 1);
        assert_eq!(raster.descriptor().size, (1, 1));
        assert!(raster.descriptor().url.is_none());
    }
}
