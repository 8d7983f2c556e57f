//! Geolocator pressure timeseries types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Grouping key for a labeled timeseries.
///
/// Callers send either integers or strings; both are accepted and compared
/// by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    /// Numeric label
    Int(i64),
    /// Textual label
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{v}"),
            Label::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Int(v)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Text(s.to_string())
    }
}

/// An ordered pressure timeseries without grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureSeries {
    /// Timestamps in unix seconds
    pub time: Vec<i64>,
    /// Measured pressure in Pascals
    pub pressure: Vec<f64>,
}

impl PressureSeries {
    /// Create a series, validating that the arrays are parallel and non-empty.
    pub fn new(time: Vec<i64>, pressure: Vec<f64>) -> Result<Self> {
        if time.is_empty() {
            return Err(EngineError::validation("time and pressure must not be empty"));
        }
        if time.len() != pressure.len() {
            return Err(EngineError::validation(
                "pressure and time need to have the same length",
            ));
        }
        Ok(Self { time, pressure })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Whether the series is empty. Always false for a validated series.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// A pressure timeseries partitioned into label groups.
///
/// Invariant: `time`, `pressure`, and `label` are parallel arrays of equal
/// length >= 1. Grouping is used only by map mode; each unique label yields
/// one independent mismatch map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledTimeseries {
    /// Timestamps in unix seconds
    pub time: Vec<i64>,
    /// Measured pressure in Pascals
    pub pressure: Vec<f64>,
    /// Group label per sample
    pub label: Vec<Label>,
}

impl LabeledTimeseries {
    /// Create a labeled series, validating the parallel-array invariant.
    pub fn new(time: Vec<i64>, pressure: Vec<f64>, label: Vec<Label>) -> Result<Self> {
        if time.is_empty() {
            return Err(EngineError::validation(
                "time, pressure and label must not be empty",
            ));
        }
        if time.len() != pressure.len() || time.len() != label.len() {
            return Err(EngineError::validation(
                "pressure, time and label need to have the same length",
            ));
        }
        Ok(Self {
            time,
            pressure,
            label,
        })
    }

    /// Number of samples across all groups.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Whether the series is empty. Always false for a validated series.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Partition the series into label groups.
    ///
    /// Groups are returned in order of first appearance; sample indices
    /// within a group preserve input order.
    pub fn groups(&self) -> Vec<(Label, Vec<usize>)> {
        let mut groups: Vec<(Label, Vec<usize>)> = Vec::new();
        for (i, label) in self.label.iter().enumerate() {
            match groups.iter_mut().find(|(l, _)| l == label) {
                Some((_, indices)) => indices.push(i),
                None => groups.push((label.clone(), vec![i])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_rejected() {
        let err = LabeledTimeseries::new(
            vec![0, 3600],
            vec![101_000.0],
            vec![Label::from(1), Label::from(1)],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(PressureSeries::new(vec![], vec![]).is_err());
        assert!(LabeledTimeseries::new(vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn test_groups_preserve_order() {
        let ts = LabeledTimeseries::new(
            vec![0, 3600, 7200, 10800],
            vec![101_000.0, 101_010.0, 101_020.0, 101_030.0],
            vec![
                Label::from(2),
                Label::from(1),
                Label::from(2),
                Label::from(1),
            ],
        )
        .unwrap();

        let groups = ts.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, Label::from(2));
        assert_eq!(groups[0].1, vec![0, 2]);
        assert_eq!(groups[1].0, Label::from(1));
        assert_eq!(groups[1].1, vec![1, 3]);
    }

    #[test]
    fn test_single_label_single_group() {
        let ts = LabeledTimeseries::new(
            vec![1_572_075_000, 1_572_076_800, 1_572_078_600],
            vec![97_766.0, 97_800.0, 97_833.0],
            vec![Label::from(1), Label::from(1), Label::from(1)],
        )
        .unwrap();
        assert_eq!(ts.groups().len(), 1);
    }

    #[test]
    fn test_label_display_and_json() {
        assert_eq!(Label::from(3).to_string(), "3");
        assert_eq!(Label::from("stationary-1").to_string(), "stationary-1");

        let labels: Vec<Label> = serde_json::from_str(r#"[1, "a", 2]"#).unwrap();
        assert_eq!(labels[0], Label::Int(1));
        assert_eq!(labels[1], Label::from("a"));
    }
}
