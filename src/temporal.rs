//! Temporal alignment against the reanalysis dataset's fixed hourly grid.
//!
//! The reference dataset only exists at whole hours. Every requested
//! timestamp is snapped to the nearest hour, and the effective (matched)
//! timestamp is reported separately from the requested one so callers can
//! inspect the discrepancy.

use crate::error::{EngineError, Result};

/// Fixed step of the reference dataset, in seconds.
pub const STEP_SECONDS: i64 = 3600;

/// A requested timestamp together with the reference timestamp it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedTime {
    /// Timestamp as requested by the caller (unix seconds)
    pub requested: i64,
    /// Nearest available reference timestamp (unix seconds, whole hour)
    pub matched: i64,
}

impl MatchedTime {
    /// Signed difference `matched - requested`, in seconds.
    ///
    /// Always within `[-STEP_SECONDS/2, STEP_SECONDS/2]`.
    pub fn offset(&self) -> i64 {
        self.matched - self.requested
    }
}

/// Snap a timestamp to the nearest whole hour of the reference grid.
///
/// Ties (exactly half an hour) round up. Idempotent: matching an already
/// matched timestamp returns it unchanged.
pub fn match_time(requested: i64) -> MatchedTime {
    let matched = (requested + STEP_SECONDS / 2).div_euclid(STEP_SECONDS) * STEP_SECONDS;
    MatchedTime { requested, matched }
}

/// Snap a sequence of timestamps to the reference grid.
pub fn match_times(requested: &[i64]) -> Vec<MatchedTime> {
    requested.iter().map(|&t| match_time(t)).collect()
}

/// Inclusive hourly sequence `[start, start + 3600, ...]` up to `end`.
///
/// The sequence starts exactly at `start` and steps by the reference grid
/// step; the last element is the largest value not exceeding `end`.
/// Rejects `end < start`.
pub fn hourly_range(start: i64, end: i64) -> Result<Vec<i64>> {
    if end < start {
        return Err(EngineError::validation(format!(
            "endTime ({end}) must not be earlier than startTime ({start})"
        )));
    }
    Ok((start..=end).step_by(STEP_SECONDS as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_is_whole_hour_and_close() {
        for &t in &[0i64, 1, 1799, 1800, 1801, 1_572_075_000, -7200, -1801] {
            let m = match_time(t);
            assert_eq!(m.matched.rem_euclid(STEP_SECONDS), 0, "t={t}");
            assert!(m.offset().abs() <= STEP_SECONDS / 2, "t={t}");
        }
    }

    #[test]
    fn test_match_rounds_to_nearest() {
        assert_eq!(match_time(1799).matched, 0);
        assert_eq!(match_time(1800).matched, 3600);
        assert_eq!(match_time(3600).matched, 3600);
        // 1572075000 is exactly between 1572073200 and 1572076800
        assert_eq!(match_time(1_572_075_000).matched, 1_572_076_800);
    }

    #[test]
    fn test_match_idempotent() {
        let m = match_time(1_572_075_000);
        assert_eq!(match_time(m.matched).matched, m.matched);
    }

    #[test]
    fn test_hourly_range_inclusive() {
        let range = hourly_range(1_497_916_800, 1_500_667_800).unwrap();
        assert_eq!(range.len(), (1_500_667_800 - 1_497_916_800) as usize / 3600 + 1);
        assert_eq!(range[0], 1_497_916_800);
        assert_eq!(range[1] - range[0], STEP_SECONDS);
        assert!(*range.last().unwrap() <= 1_500_667_800);
    }

    #[test]
    fn test_hourly_range_single_point() {
        assert_eq!(hourly_range(3600, 3600).unwrap(), vec![3600]);
    }

    #[test]
    fn test_hourly_range_rejects_inverted() {
        assert!(hourly_range(7200, 3600).is_err());
    }
}
