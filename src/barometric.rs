//! Barometric pressure-to-altitude conversion.
//!
//! Implements the standard barometric formula with a temperature lapse
//! correction, using time-matched surface pressure and 2 m air temperature
//! as the local reference:
//!
//! ```text
//! dh = (T / Lb) * ((p / p0)^(-R*Lb / (g0*M)) - 1)
//! ```
//!
//! The result is the height above the reference surface-pressure level
//! (sea-level-relative, not geoid-corrected). Near the surface the
//! sensitivity is roughly 10 m per hPa, which is how the map-mode `margin`
//! parameter (meters) relates to pressure uncertainty.

use crate::error::{EngineError, Result};

/// Standard temperature lapse rate [K/m].
pub const LAPSE_RATE: f64 = -0.0065;

/// Universal gas constant [N·m/(mol·K)].
pub const GAS_CONSTANT: f64 = 8.31432;

/// Gravitational acceleration [m/s²].
pub const GRAVITY: f64 = 9.80665;

/// Molar mass of Earth's air [kg/mol].
pub const MOLAR_MASS: f64 = 0.0289644;

/// Lower bound of physically plausible measured pressure [Pa].
pub const PRESSURE_MIN: f64 = 15_000.0;

/// Upper bound of physically plausible measured pressure [Pa].
pub const PRESSURE_MAX: f64 = 108_000.0;

/// Check that a pressure value is inside the plausible atmospheric range.
pub fn check_pressure(pressure: f64, what: &str) -> Result<()> {
    if !pressure.is_finite() || !(PRESSURE_MIN..=PRESSURE_MAX).contains(&pressure) {
        return Err(EngineError::computation(format!(
            "{what} {pressure} Pa outside plausible range [{PRESSURE_MIN}, {PRESSURE_MAX}]"
        )));
    }
    Ok(())
}

/// Altitude above the reference pressure level, in meters.
///
/// * `pressure` - measured pressure [Pa]
/// * `surface_pressure` - time-matched reanalysis surface pressure at the
///   candidate location [Pa]
/// * `temperature_2m` - time-matched 2 m air temperature [K]
///
/// Returns a computation error when either pressure is outside
/// [`PRESSURE_MIN`, `PRESSURE_MAX`] or the temperature is non-physical,
/// rather than silently producing NaN.
pub fn altitude(pressure: f64, surface_pressure: f64, temperature_2m: f64) -> Result<f64> {
    check_pressure(pressure, "measured pressure")?;
    check_pressure(surface_pressure, "surface pressure")?;
    if !temperature_2m.is_finite() || temperature_2m <= 0.0 {
        return Err(EngineError::computation(format!(
            "temperature {temperature_2m} K is not physical"
        )));
    }

    let exponent = -GAS_CONSTANT * LAPSE_RATE / (GRAVITY * MOLAR_MASS);
    Ok(temperature_2m / LAPSE_RATE * ((pressure / surface_pressure).powf(exponent) - 1.0))
}

/// Altitude for each element of a measured series against matched
/// reference surface pressure and temperature series.
///
/// All three slices must have the same length.
pub fn altitude_series(
    pressure: &[f64],
    surface_pressure: &[f64],
    temperature_2m: &[f64],
) -> Result<Vec<f64>> {
    if pressure.len() != surface_pressure.len() || pressure.len() != temperature_2m.len() {
        return Err(EngineError::computation(
            "pressure, surface pressure, and temperature series must have the same length",
        ));
    }
    pressure
        .iter()
        .zip(surface_pressure.iter().zip(temperature_2m.iter()))
        .map(|(&p, (&p0, &t))| altitude(p, p0, t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_pressure_is_zero_altitude() {
        let h = altitude(101_325.0, 101_325.0, 288.15).unwrap();
        assert!(h.abs() < 1e-9, "got {h}");
    }

    #[test]
    fn test_lower_pressure_is_positive_altitude() {
        // ~500 m above the reference level at standard conditions
        let h = altitude(95_461.0, 101_325.0, 288.15).unwrap();
        assert!(h > 400.0 && h < 600.0, "got {h}");
    }

    #[test]
    fn test_higher_pressure_is_negative_altitude() {
        let h = altitude(102_000.0, 101_325.0, 288.15).unwrap();
        assert!(h < 0.0, "got {h}");
    }

    #[test]
    fn test_sensitivity_near_surface() {
        // One hPa near sea level should move the altitude by roughly 10 m,
        // which is the documented margin conversion.
        let h1 = altitude(101_325.0, 101_325.0, 288.15).unwrap();
        let h2 = altitude(101_225.0, 101_325.0, 288.15).unwrap();
        let per_hpa = h2 - h1;
        assert!((per_hpa - 8.4).abs() < 1.0, "got {per_hpa} m/hPa");
    }

    #[test]
    fn test_out_of_range_pressure_rejected() {
        assert!(altitude(500.0, 101_325.0, 288.15).is_err());
        assert!(altitude(101_325.0, 120_000.0, 288.15).is_err());
        assert!(altitude(f64::NAN, 101_325.0, 288.15).is_err());
    }

    #[test]
    fn test_non_physical_temperature_rejected() {
        assert!(altitude(101_325.0, 101_325.0, -5.0).is_err());
        assert!(altitude(101_325.0, 101_325.0, f64::NAN).is_err());
    }

    #[test]
    fn test_series_length_mismatch() {
        let err = altitude_series(&[101_000.0], &[101_325.0, 101_325.0], &[288.0, 288.0]);
        assert!(err.is_err());
    }

    #[test]
    fn test_series_matches_scalar() {
        let hs = altitude_series(
            &[95_461.0, 101_325.0],
            &[101_325.0, 101_325.0],
            &[288.15, 288.15],
        )
        .unwrap();
        assert_eq!(hs.len(), 2);
        assert!((hs[0] - altitude(95_461.0, 101_325.0, 288.15).unwrap()).abs() < 1e-12);
    }
}
