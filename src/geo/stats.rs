//! Statistics helpers shared by the mismatch engine and the path sampler.

/// Arithmetic mean of a slice. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean-removed mean-squared error between two aligned series.
///
/// The mean of the pointwise errors is subtracted before squaring, so the
/// result is invariant under adding a constant offset to either series.
/// This is what allows an unknown constant altitude offset between the
/// sensor and the reference grid.
///
/// # Panics
///
/// Panics if the series have different lengths or are empty.
pub fn mean_removed_mse(observed: &[f64], reference: &[f64]) -> f64 {
    assert_eq!(
        observed.len(),
        reference.len(),
        "observed and reference must have same length"
    );
    assert!(!observed.is_empty(), "series must not be empty");

    let n = observed.len() as f64;
    let errors: Vec<f64> = observed
        .iter()
        .zip(reference.iter())
        .map(|(&o, &r)| o - r)
        .collect();
    let bias = errors.iter().sum::<f64>() / n;

    errors.iter().map(|e| (e - bias) * (e - bias)).sum::<f64>() / n
}

/// Percentile of a sample with linear interpolation between ranks.
///
/// `p` is in [0, 100]. Matches the default interpolation of common
/// scientific stacks: the rank position is `p/100 * (n - 1)`.
///
/// # Panics
///
/// Panics if `values` is empty or `p` is outside [0, 100].
pub fn percentile(values: &[f64], p: f64) -> f64 {
    assert!(!values.is_empty(), "percentile of empty sample");
    assert!((0.0..=100.0).contains(&p), "percentile must be in [0, 100]");

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("NaN in percentile input"));

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] * (1.0 - frac) + sorted[upper] * frac
}
