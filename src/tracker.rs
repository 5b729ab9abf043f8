//! Rolling performance statistics for one study key.
//!
//! The tracker owns the ordered sequence of observations. Statistics are always computed
//! over the tail of that sequence; nothing is ever removed.

use serde::Serialize;
use tracing::debug;

use crate::domain::{Outcome, PerformanceRecord, Streak};
use crate::error::TutorError;

pub const DEFAULT_WINDOW: usize = 10;

/// Whole-sequence aggregates.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub attempts: usize,
    pub correct: usize,
    pub incorrect: usize,
    /// Percent, 0..=100.
    pub accuracy: f64,
    pub avg_response_time: f64,
}

#[derive(Clone, Debug, Default)]
pub struct PerformanceTracker {
    records: Vec<PerformanceRecord>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored records, oldest first.
    pub fn from_records(records: Vec<PerformanceRecord>) -> Self {
        Self { records }
    }

    /// Validate and append one observation.
    pub fn record(
        &mut self,
        is_correct: bool,
        response_time_seconds: f64,
        difficulty_used: i64,
    ) -> Result<(), TutorError> {
        let record = PerformanceRecord::observe(is_correct, response_time_seconds, difficulty_used)?;
        self.push(record);
        Ok(())
    }

    /// Append an already validated record.
    pub fn push(&mut self, record: PerformanceRecord) {
        debug!(
            target: "difficulty",
            is_correct = record.is_correct,
            response_time = record.response_time_seconds,
            difficulty = record.difficulty_used.value(),
            total = self.records.len() + 1,
            "Observation recorded"
        );
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PerformanceRecord] {
        &self.records
    }

    /// The last `n` records (all of them if fewer exist).
    pub fn window(&self, n: usize) -> &[PerformanceRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Fraction of correct answers in the trailing window, `None` when there is nothing to measure.
    pub fn recent_accuracy(&self, window_size: usize) -> Option<f64> {
        accuracy_of(self.window(window_size))
    }

    /// Mean response time (seconds) in the trailing window.
    pub fn average_response_time(&self, window_size: usize) -> Option<f64> {
        mean_response_time(self.window(window_size))
    }

    pub fn consecutive_streak(&self) -> Option<Streak> {
        let last = self.records.last()?;
        let length = self
            .records
            .iter()
            .rev()
            .take_while(|r| r.is_correct == last.is_correct)
            .count();
        Some(Streak { outcome: Outcome::from(last.is_correct), length })
    }

    pub fn summary(&self) -> PerformanceSummary {
        let attempts = self.records.len();
        if attempts == 0 {
            return PerformanceSummary::default();
        }
        let correct = self.records.iter().filter(|r| r.is_correct).count();
        PerformanceSummary {
            attempts,
            correct,
            incorrect: attempts - correct,
            accuracy: round2(correct as f64 / attempts as f64 * 100.0),
            avg_response_time: round2(mean_response_time(&self.records).unwrap_or(0.0)),
        }
    }
}

/// Fraction in 0..=1; `None` for an empty slice.
pub fn accuracy_of(records: &[PerformanceRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let correct = records.iter().filter(|r| r.is_correct).count();
    Some(correct as f64 / records.len() as f64)
}

pub fn mean_response_time(records: &[PerformanceRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let total: f64 = records.iter().map(|r| r.response_time_seconds).sum();
    Some(total / records.len() as f64)
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_from(outcomes: &[bool]) -> PerformanceTracker {
        let mut t = PerformanceTracker::new();
        for (i, ok) in outcomes.iter().enumerate() {
            t.record(*ok, (i + 1) as f64, 2).unwrap();
        }
        t
    }

    #[test]
    fn empty_tracker_reports_insufficient_data() {
        let t = PerformanceTracker::new();
        assert_eq!(t.recent_accuracy(DEFAULT_WINDOW), None);
        assert_eq!(t.average_response_time(DEFAULT_WINDOW), None);
        assert_eq!(t.consecutive_streak(), None);
        assert_eq!(t.summary(), PerformanceSummary::default());
    }

    #[test]
    fn accuracy_uses_trailing_window_only() {
        // 5 misses followed by 10 hits: the last 10 are perfect.
        let mut outcomes = vec![false; 5];
        outcomes.extend(vec![true; 10]);
        let t = tracker_from(&outcomes);
        assert_eq!(t.recent_accuracy(10), Some(1.0));
        assert_eq!(t.recent_accuracy(15), Some(10.0 / 15.0));
    }

    #[test]
    fn accuracy_with_fewer_records_than_window() {
        let t = tracker_from(&[true, false, true, true]);
        assert_eq!(t.recent_accuracy(10), Some(0.75));
        assert_eq!(t.recent_accuracy(0), None);
    }

    #[test]
    fn average_response_time_over_window() {
        // times are 1..=4
        let t = tracker_from(&[true, true, true, true]);
        assert_eq!(t.average_response_time(2), Some(3.5));
        assert_eq!(t.average_response_time(10), Some(2.5));
    }

    #[test]
    fn streak_counts_trailing_run() {
        let t = tracker_from(&[true, false, false, true, true, true]);
        assert_eq!(t.consecutive_streak(), Some(Streak { outcome: Outcome::Correct, length: 3 }));

        let t = tracker_from(&[true, false]);
        assert_eq!(t.consecutive_streak(), Some(Streak { outcome: Outcome::Incorrect, length: 1 }));
    }

    #[test]
    fn invalid_observations_are_rejected_and_not_stored() {
        let mut t = PerformanceTracker::new();
        assert!(matches!(t.record(true, -0.5, 2), Err(TutorError::InvalidObservation(_))));
        assert!(matches!(t.record(true, 3.0, 6), Err(TutorError::InvalidObservation(_))));
        assert!(t.is_empty());
    }

    #[test]
    fn summary_rounds_percentages() {
        let t = tracker_from(&[true, true, false]);
        let s = t.summary();
        assert_eq!(s.attempts, 3);
        assert_eq!(s.correct, 2);
        assert_eq!(s.incorrect, 1);
        assert_eq!(s.accuracy, 66.67);
        assert_eq!(s.avg_response_time, 2.0);
    }
}
