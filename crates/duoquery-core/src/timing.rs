//! Round-trip timing and the executor result envelope.

use crate::error::QueryError;
use crate::query::ExecutionMode;
use crate::table::ResultTable;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Latency of one executed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub operation_label: String,
    pub mode: ExecutionMode,
    /// Always >= 0; 0 when the round trip never happened.
    pub elapsed_seconds: f64,
}

impl TimingSample {
    pub fn new(operation_label: impl Into<String>, mode: ExecutionMode, elapsed: Duration) -> Self {
        Self {
            operation_label: operation_label.into(),
            mode,
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }

    pub fn zero(operation_label: impl Into<String>, mode: ExecutionMode) -> Self {
        Self::new(operation_label, mode, Duration::ZERO)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_seconds.max(0.0))
    }
}

/// Run `round_trip` and measure it. Callers acquire the connection before
/// and release it after, so only the round trip is on the clock.
pub(crate) fn time_round_trip<T>(round_trip: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = round_trip();
    (out, start.elapsed())
}

/// What an executor hands back: always a table and a timing sample, plus the
/// backend error when the round trip failed (table empty, timing zero).
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub table: ResultTable,
    pub timing: TimingSample,
    pub error: Option<QueryError>,
}

impl Execution {
    pub(crate) fn succeeded(table: ResultTable, timing: TimingSample) -> Self {
        Self {
            table,
            timing,
            error: None,
        }
    }

    pub(crate) fn failed(label: String, mode: ExecutionMode, error: QueryError) -> Self {
        Self {
            table: ResultTable::default(),
            timing: TimingSample::zero(label, mode),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the `(table, timing)` pair, surfacing the side-channel error.
    pub fn into_parts(self) -> (ResultTable, TimingSample, Option<QueryError>) {
        (self.table, self.timing, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sample_has_no_duration() {
        let t = TimingSample::zero("find transactionlog", ExecutionMode::Baseline);
        assert_eq!(t.elapsed_seconds, 0.0);
        assert_eq!(t.elapsed(), Duration::ZERO);
    }

    #[test]
    fn measured_round_trip_is_non_negative() {
        let (value, elapsed) = time_round_trip(|| 40 + 2);
        assert_eq!(value, 42);
        let sample = TimingSample::new("q", ExecutionMode::Optimized, elapsed);
        assert!(sample.elapsed_seconds >= 0.0);
    }
}
