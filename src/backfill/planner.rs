//! Backfill window planning
//!
//! Pure partitioning of a requested time range into ordered, contiguous,
//! non-overlapping windows sized to the provider's page limit. No I/O
//! happens here.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

/// A half-open `[start, end)` chunk of a backfill range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Planning failures. Both are caller misuse and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Invalid range: end {end} must be after start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Unsupported granularity {granularity_secs}s (supported: {supported:?})")]
    InvalidGranularity {
        granularity_secs: u32,
        supported: Vec<u32>,
    },
}

/// Partitions backfill ranges into provider-sized windows.
///
/// The supported granularity set and the page limit are configuration,
/// injected at construction rather than baked in for one provider.
#[derive(Debug, Clone)]
pub struct WindowPlanner {
    supported_granularities: BTreeSet<u32>,
    max_points_per_request: u32,
}

impl WindowPlanner {
    pub fn new(
        supported_granularities: impl IntoIterator<Item = u32>,
        max_points_per_request: u32,
    ) -> Self {
        Self {
            supported_granularities: supported_granularities.into_iter().collect(),
            max_points_per_request,
        }
    }

    /// Plan `[start, end)` into ordered windows.
    ///
    /// Each window spans at most `granularity_secs * max_points_per_request`
    /// seconds. The union of the windows is exactly the requested range,
    /// windows never overlap, and every window has `start < end`.
    pub fn plan(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity_secs: u32,
    ) -> Result<Vec<TimeWindow>, PlanError> {
        if end <= start {
            return Err(PlanError::InvalidRange { start, end });
        }
        if !self.supported_granularities.contains(&granularity_secs) {
            return Err(PlanError::InvalidGranularity {
                granularity_secs,
                supported: self.supported_granularities.iter().copied().collect(),
            });
        }

        let span = Duration::seconds(i64::from(granularity_secs) * i64::from(self.max_points_per_request));

        let mut windows = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let window_end = std::cmp::min(cursor + span, end);
            windows.push(TimeWindow::new(cursor, window_end));
            cursor = window_end;
        }

        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn planner() -> WindowPlanner {
        WindowPlanner::new([60, 300, 900, 3600, 21600, 86400], 300)
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_six_hours_at_one_minute() {
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 1, 6, 0, 0);

        let windows = planner().plan(start, end, 60).unwrap();

        // 300 one-minute candles per page: five hours, then the remainder.
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], TimeWindow::new(start, utc(2024, 1, 1, 5, 0, 0)));
        assert_eq!(windows[1], TimeWindow::new(utc(2024, 1, 1, 5, 0, 0), end));
    }

    #[test]
    fn test_exact_multiple_has_no_stub_window() {
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 1, 10, 0, 0);

        let windows = planner().plan(start, end, 60).unwrap();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end, end);
    }

    #[test]
    fn test_range_smaller_than_one_page() {
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 1, 0, 30, 0);

        let windows = planner().plan(start, end, 60).unwrap();

        assert_eq!(windows, vec![TimeWindow::new(start, end)]);
    }

    #[test]
    fn test_coverage_is_contiguous_and_bounded() {
        let start = utc(2024, 3, 10, 7, 13, 42);
        let end = utc(2024, 3, 12, 19, 1, 5);
        let granularity = 300u32;

        let windows = planner().plan(start, end, granularity).unwrap();

        assert_eq!(windows.first().unwrap().start, start);
        assert_eq!(windows.last().unwrap().end, end);
        let max_span = Duration::seconds(i64::from(granularity) * 300);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for w in &windows {
            assert!(w.start < w.end);
            assert!(w.end - w.start <= max_span);
        }
    }

    #[test]
    fn test_rejects_inverted_range() {
        let start = utc(2024, 1, 2, 0, 0, 0);
        let end = utc(2024, 1, 1, 0, 0, 0);

        let err = planner().plan(start, end, 60).unwrap_err();
        assert!(matches!(err, PlanError::InvalidRange { .. }));
    }

    #[test]
    fn test_rejects_empty_range() {
        let at = utc(2024, 1, 1, 0, 0, 0);
        let err = planner().plan(at, at, 60).unwrap_err();
        assert!(matches!(err, PlanError::InvalidRange { .. }));
    }

    #[test]
    fn test_rejects_unsupported_granularity() {
        let start = utc(2024, 1, 1, 0, 0, 0);
        let end = utc(2024, 1, 1, 1, 0, 0);

        let err = planner().plan(start, end, 42).unwrap_err();
        match err {
            PlanError::InvalidGranularity {
                granularity_secs,
                supported,
            } => {
                assert_eq!(granularity_secs, 42);
                assert!(supported.contains(&60));
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }
}
