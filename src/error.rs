//! Error taxonomy for the computation engine.
//!
//! Three failure classes exist:
//! - [`EngineError::Validation`]: malformed request fields. Never retried.
//! - [`EngineError::DataSource`]: the external reanalysis/elevation accessor
//!   timed out or failed transiently. Retried once before surfacing.
//! - [`EngineError::Computation`]: a physically invalid input reached the
//!   numerical core (pressure outside the barometric domain, degenerate path).
//!
//! No-data conditions (open water, missing reference coverage) are never
//! errors; they are encoded as sentinel values in the result rasters.

use thiserror::Error;

/// Advice attached to validation failures.
pub const ADVICE_VALIDATION: &str = "Double check the inputs.";

/// Advice attached to data-source failures.
pub const ADVICE_DATA_SOURCE: &str =
    "The reference data source did not respond. Please try again later.";

/// Error type for all engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing, malformed, or out-of-range request field.
    #[error("{message}")]
    Validation {
        /// What is wrong with the request
        message: String,
        /// Remediation advice for the caller
        advice: String,
    },

    /// External accessor timeout, rate limit, or transient failure.
    #[error("data source failure: {message}")]
    DataSource {
        /// Description of the failed lookup
        message: String,
        /// Whether a retry was already attempted
        retried: bool,
    },

    /// Numerically invalid input reached the computation core.
    #[error("{message}")]
    Computation {
        /// What input was invalid
        message: String,
    },
}

impl EngineError {
    /// Validation error with the default advice string.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            advice: ADVICE_VALIDATION.to_string(),
        }
    }

    /// Validation error with custom remediation advice.
    pub fn validation_with_advice(message: impl Into<String>, advice: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            advice: advice.into(),
        }
    }

    /// Transient data-source failure (not yet retried).
    pub fn data_source(message: impl Into<String>) -> Self {
        Self::DataSource {
            message: message.into(),
            retried: false,
        }
    }

    /// Computation-domain error.
    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation {
            message: message.into(),
        }
    }

    /// Remediation advice for the response envelope.
    pub fn advice(&self) -> &str {
        match self {
            Self::Validation { advice, .. } => advice,
            Self::DataSource { .. } => ADVICE_DATA_SOURCE,
            Self::Computation { .. } => ADVICE_VALIDATION,
        }
    }

    /// Whether a single retry is permitted for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DataSource { retried: false, .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_carries_default_advice() {
        let err = EngineError::validation("W is not a float number");
        assert_eq!(err.advice(), ADVICE_VALIDATION);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_data_source_retryable_once() {
        let err = EngineError::data_source("timeout fetching sample");
        assert!(err.is_retryable());

        let err = EngineError::DataSource {
            message: "timeout fetching sample".to_string(),
            retried: true,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.advice(), ADVICE_DATA_SOURCE);
    }

    #[test]
    fn test_display_messages() {
        let err = EngineError::computation("pressure 500 Pa outside plausible range");
        assert_eq!(err.to_string(), "pressure 500 Pa outside plausible range");

        let err = EngineError::data_source("rate limited");
        assert_eq!(err.to_string(), "data source failure: rate limited");
    }
}
