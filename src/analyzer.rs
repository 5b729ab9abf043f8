//! Trajectory classification and weak-area detection.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{MasteryStatus, PerformanceRecord, TopicMastery, Trajectory};
use crate::tracker::{accuracy_of, mean_response_time, round2, DEFAULT_WINDOW};

pub const DEFAULT_WEAK_THRESHOLD: f64 = 70.0;

const MASTERING_ACCURACY: f64 = 90.0;
const PROFICIENT_ACCURACY: f64 = 75.0;
const STRUGGLING_ACCURACY: f64 = 50.0;
/// Percentage-point swing between consecutive windows that counts as a real trend.
const TREND_POINTS: f64 = 10.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrajectoryReport {
    pub label: Trajectory,
    /// Percent over the most recent window.
    pub recent_accuracy: f64,
    /// Percent over the window right before it, if the history is long enough.
    pub previous_accuracy: Option<f64>,
    /// `recent - previous` in percentage points.
    pub trend: Option<f64>,
    pub overall_accuracy: f64,
    /// Seconds saved per answer: mean time of the first window minus mean time of the last.
    pub speed_improvement: f64,
    pub total_attempts: usize,
}

/// One answered question tagged with the topic it exercised.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicAttempt {
    pub topic: String,
    pub is_correct: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopicStat {
    pub topic: String,
    pub accuracy: f64,
    pub attempts: usize,
    pub correct: usize,
    pub status: MasteryStatus,
}

#[derive(Clone, Debug)]
pub struct PerformanceAnalyzer {
    window_size: usize,
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self { window_size: DEFAULT_WINDOW }
    }
}

impl PerformanceAnalyzer {
    pub fn new(window_size: usize) -> Self {
        Self { window_size: window_size.max(1) }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Classify a history (oldest first). `None` when there is nothing to classify.
    pub fn classify(&self, records: &[PerformanceRecord]) -> Option<TrajectoryReport> {
        let n = records.len();
        let w = self.window_size;
        let recent_slice = &records[n.saturating_sub(w)..];
        let recent = accuracy_of(recent_slice)? * 100.0;

        let previous = if n > w {
            let end = n - w;
            accuracy_of(&records[end.saturating_sub(w)..end]).map(|a| a * 100.0)
        } else {
            None
        };
        let trend = previous.map(|p| recent - p);
        let label = label_for(recent, trend);

        let early = mean_response_time(&records[..w.min(n)]).unwrap_or(0.0);
        let late = mean_response_time(recent_slice).unwrap_or(0.0);

        Some(TrajectoryReport {
            label,
            recent_accuracy: round2(recent),
            previous_accuracy: previous.map(round2),
            trend: trend.map(round2),
            overall_accuracy: round2(accuracy_of(records).unwrap_or(0.0) * 100.0),
            speed_improvement: round2(early - late),
            total_attempts: n,
        })
    }

    /// Topics whose stored mastery is strictly below `threshold`, weakest first.
    pub fn identify_weak_areas(&self, mastery: &[TopicMastery], threshold: f64) -> Vec<TopicMastery> {
        let mut weak: Vec<TopicMastery> = mastery
            .iter()
            .filter(|t| t.mastery_percentage < threshold)
            .cloned()
            .collect();
        weak.sort_by(|a, b| a.mastery_percentage.total_cmp(&b.mastery_percentage));
        weak
    }

    /// Per-topic accuracy computed from raw attempts, worst first.
    pub fn summarize_topics(&self, attempts: &[TopicAttempt]) -> Vec<TopicStat> {
        let mut by_topic: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for a in attempts {
            let entry = by_topic.entry(a.topic.as_str()).or_insert((0, 0));
            entry.0 += 1;
            if a.is_correct {
                entry.1 += 1;
            }
        }
        let mut stats: Vec<TopicStat> = by_topic
            .into_iter()
            .map(|(topic, (total, correct))| {
                let accuracy = round2(correct as f64 / total as f64 * 100.0);
                TopicStat {
                    topic: topic.to_string(),
                    accuracy,
                    attempts: total,
                    correct,
                    status: MasteryStatus::from_accuracy(accuracy),
                }
            })
            .collect();
        stats.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
        stats
    }
}

fn label_for(recent: f64, trend: Option<f64>) -> Trajectory {
    let declining = trend.map(|t| t <= -TREND_POINTS).unwrap_or(false);
    let improving = trend.map(|t| t >= TREND_POINTS).unwrap_or(false);

    if recent >= MASTERING_ACCURACY && !declining {
        Trajectory::Mastering
    } else if recent >= PROFICIENT_ACCURACY {
        Trajectory::Proficient
    } else if improving {
        Trajectory::Improving
    } else if recent < STRUGGLING_ACCURACY {
        Trajectory::Struggling
    } else {
        Trajectory::Stable
    }
}
