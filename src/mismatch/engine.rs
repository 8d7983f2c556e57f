//! The mismatch computation over grid cells.

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{GridSpec, MapOptions, MismatchRaster, NO_DATA, PRUNED};
use crate::access::{retry_once, ElevationAccessor, ReanalysisAccessor, ReferenceSample};
use crate::barometric;
use crate::error::Result;
use crate::geo::mean_removed_mse;
use crate::series::{Label, LabeledTimeseries};

/// Computes per-label mismatch rasters against injected accessors.
pub struct MismatchEngine<'a, R, E> {
    reanalysis: &'a R,
    elevation: &'a E,
}

impl<'a, R: ReanalysisAccessor, E: ElevationAccessor> MismatchEngine<'a, R, E> {
    /// Create an engine over the given accessors.
    pub fn new(reanalysis: &'a R, elevation: &'a E) -> Self {
        Self {
            reanalysis,
            elevation,
        }
    }

    /// Compute one raster per label group of the series.
    ///
    /// Groups are evaluated independently and returned in order of first
    /// label appearance. The whole request fails if any group fails; there
    /// is no partial map result.
    pub fn compute(
        &self,
        series: &LabeledTimeseries,
        spec: &GridSpec,
        options: &MapOptions,
    ) -> Result<Vec<MismatchRaster>> {
        options.validate()?;
        for &p in &series.pressure {
            barometric::check_pressure(p, "measured pressure")?;
        }

        series
            .groups()
            .into_iter()
            .map(|(label, indices)| self.evaluate_group(&label, series, &indices, spec, options))
            .collect()
    }

    fn evaluate_group(
        &self,
        label: &Label,
        series: &LabeledTimeseries,
        indices: &[usize],
        spec: &GridSpec,
        options: &MapOptions,
    ) -> Result<MismatchRaster> {
        let sampled = sample_indices(indices, options.max_sample, options.seed);
        let times: Vec<i64> = sampled.iter().map(|&i| series.time[i]).collect();
        let pressures: Vec<f64> = sampled.iter().map(|&i| series.pressure[i]).collect();

        tracing::debug!(
            label = %label,
            samples = sampled.len(),
            of = indices.len(),
            cells = spec.cells(),
            "evaluating label group"
        );

        // The mask drives pruning, so it is computed first whenever either
        // the mask band or a threshold is requested.
        let need_mask = options.include_mask || options.mask_threshold > 0.0;

        let mut mse = vec![NO_DATA; spec.cells()];
        let mut mask = vec![NO_DATA; spec.cells()];

        for row in 0..spec.height {
            for col in 0..spec.width {
                let cell = row * spec.width + col;
                let (lon, lat) = spec.cell_center(col, row);

                if !retry_once(|| self.reanalysis.has_coverage(lon, lat))? {
                    continue; // stays NO_DATA
                }
                let Some(refs) = self.fetch_reference(lon, lat, &times)? else {
                    continue;
                };

                if need_mask {
                    let bounds =
                        retry_once(|| self.elevation.bounds_at(lon, lat, spec.resolution()))?;
                    let Some(bounds) = bounds else {
                        continue; // covered by reanalysis but no ground data
                    };

                    let mut consistent = 0usize;
                    for (&p, r) in pressures.iter().zip(refs.iter()) {
                        let h = barometric::altitude(p, r.surface_pressure, r.temperature)?;
                        if h >= bounds.min - options.margin && h <= bounds.max + options.margin {
                            consistent += 1;
                        }
                    }
                    let fraction = consistent as f64 / pressures.len() as f64;
                    mask[cell] = fraction;

                    if options.mask_threshold > 0.0 && fraction < options.mask_threshold {
                        mse[cell] = PRUNED;
                        continue;
                    }
                }

                let reference: Vec<f64> = refs.iter().map(|r| r.surface_pressure).collect();
                mse[cell] = mean_removed_mse(&pressures, &reference);
            }
        }

        Ok(MismatchRaster {
            label: label.clone(),
            spec: *spec,
            mse,
            mask: options.include_mask.then_some(mask),
        })
    }

    /// Time-matched reference samples for every sampled timestamp, or
    /// `None` when the cell lacks coverage for any of them.
    fn fetch_reference(
        &self,
        lon: f64,
        lat: f64,
        times: &[i64],
    ) -> Result<Option<Vec<ReferenceSample>>> {
        let mut refs = Vec::with_capacity(times.len());
        for &t in times {
            match retry_once(|| self.reanalysis.sample_at(lon, lat, t))? {
                Some(sample) => refs.push(sample),
                None => return Ok(None),
            }
        }
        Ok(Some(refs))
    }
}

/// Uniform random subsample without replacement, bounded by `max_sample`.
///
/// Returns the input order when no subsampling is needed; subsampled
/// indices are re-sorted so the series stays time-ordered. Unseeded calls
/// draw from entropy, so repeated requests may evaluate different samples.
fn sample_indices(indices: &[usize], max_sample: usize, seed: Option<u64>) -> Vec<usize> {
    if indices.len() <= max_sample {
        return indices.to_vec();
    }
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut picked: Vec<usize> = rand::seq::index::sample(&mut rng, indices.len(), max_sample)
        .iter()
        .map(|i| indices[i])
        .collect();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subsampling_below_bound() {
        let indices = vec![3, 5, 9];
        assert_eq!(sample_indices(&indices, 250, None), indices);
    }

    #[test]
    fn test_subsample_is_without_replacement_and_ordered() {
        let indices: Vec<usize> = (0..1000).collect();
        let picked = sample_indices(&indices, 250, Some(7));
        assert_eq!(picked.len(), 250);
        for pair in picked.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_subsample_deterministic_under_seed() {
        let indices: Vec<usize> = (0..1000).collect();
        assert_eq!(
            sample_indices(&indices, 100, Some(42)),
            sample_indices(&indices, 100, Some(42))
        );
        assert_ne!(
            sample_indices(&indices, 100, Some(42)),
            sample_indices(&indices, 100, Some(43))
        );
    }
}
