//! Adaptive difficulty: a per-key level in 1..=5 moved by a trailing-window accuracy rule.
//!
//! Rule, evaluated in order once at least `min_observations` records exist:
//!   1. accuracy >= `raise_threshold` and level < 5  -> level + 1
//!   2. accuracy <  `lower_threshold` and level > 1  -> level - 1
//!   3. otherwise                                    -> unchanged
//!
//! Below the minimum no decision is made; that is a normal outcome, not an error.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::domain::{Difficulty, DifficultyChange, DifficultyProfile, PerformanceRecord, Streak, StudyKey};
use crate::error::TutorError;
use crate::store::{PerformanceStore, StorageError};
use crate::tracker::{PerformanceSummary, PerformanceTracker};

/// Tuning for the adjustment rule. Deserializable so deployments can override it from TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptorConfig {
    /// Accuracy fraction at or above which the level goes up.
    pub raise_threshold: f64,
    /// Accuracy fraction strictly below which the level goes down.
    pub lower_threshold: f64,
    pub window_size: usize,
    pub min_observations: usize,
    /// Level given to a key with no stored profile.
    pub default_difficulty: Difficulty,
    /// Also log "hold" decisions into the profile history.
    pub record_holds: bool,
    /// When set, a raise additionally needs the window's mean response time (seconds) below this.
    pub max_raise_response_time: Option<f64>,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            raise_threshold: 0.85,
            lower_threshold: 0.60,
            window_size: 10,
            min_observations: 3,
            default_difficulty: Difficulty::MEDIUM,
            record_holds: false,
            max_raise_response_time: None,
        }
    }
}

/// Result of evaluating the rule against the current window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    InsufficientData { observations: usize },
    Hold { level: Difficulty, accuracy: f64 },
    Raise { from: Difficulty, to: Difficulty, accuracy: f64 },
    Lower { from: Difficulty, to: Difficulty, accuracy: f64 },
}

impl Decision {
    /// Level the decision leads to from `current`.
    pub fn target(&self, current: Difficulty) -> Difficulty {
        match *self {
            Decision::Raise { to, .. } | Decision::Lower { to, .. } => to,
            Decision::Hold { level, .. } => level,
            Decision::InsufficientData { .. } => current,
        }
    }

    pub fn changes_level(&self) -> bool {
        matches!(self, Decision::Raise { .. } | Decision::Lower { .. })
    }

    pub fn accuracy(&self) -> Option<f64> {
        match *self {
            Decision::Raise { accuracy, .. } | Decision::Lower { accuracy, .. } | Decision::Hold { accuracy, .. } => {
                Some(accuracy)
            }
            Decision::InsufficientData { .. } => None,
        }
    }

    fn reason(&self, config: &AdaptorConfig) -> String {
        match *self {
            Decision::Raise { accuracy, .. } => format!(
                "accuracy {:.1}% >= {:.1}% over last {} answers",
                accuracy * 100.0,
                config.raise_threshold * 100.0,
                config.window_size
            ),
            Decision::Lower { accuracy, .. } => format!(
                "accuracy {:.1}% < {:.1}% over last {} answers",
                accuracy * 100.0,
                config.lower_threshold * 100.0,
                config.window_size
            ),
            Decision::Hold { accuracy, .. } => format!("accuracy {:.1}% within band, holding", accuracy * 100.0),
            Decision::InsufficientData { observations } => format!("only {} observations", observations),
        }
    }
}

/// Report combining tracker aggregates with the adaptor state.
#[derive(Clone, Debug, Serialize)]
pub struct PerformanceReport {
    #[serde(flatten)]
    pub summary: PerformanceSummary,
    pub current_difficulty: Difficulty,
    pub current_difficulty_name: &'static str,
    pub recommended_difficulty: Difficulty,
    pub recommended_difficulty_name: &'static str,
    pub should_adjust: bool,
    pub streak: Option<Streak>,
}

#[derive(Clone, Debug)]
pub struct DifficultyAdaptor {
    config: AdaptorConfig,
    tracker: PerformanceTracker,
    profile: DifficultyProfile,
}

impl DifficultyAdaptor {
    /// Fresh adaptor at the configured default level.
    pub fn new(key: StudyKey, config: AdaptorConfig) -> Self {
        let profile = DifficultyProfile::new(key, config.default_difficulty);
        Self { config, tracker: PerformanceTracker::new(), profile }
    }

    /// Resume from a stored profile and stored records (oldest first).
    pub fn resume(config: AdaptorConfig, profile: DifficultyProfile, records: Vec<PerformanceRecord>) -> Self {
        Self { config, tracker: PerformanceTracker::from_records(records), profile }
    }

    /// Build the adaptor for `key` from whatever the store already knows.
    #[instrument(level = "debug", skip(store, config), fields(%key))]
    pub fn load<S: PerformanceStore + ?Sized>(
        store: &S,
        key: StudyKey,
        config: AdaptorConfig,
    ) -> Result<Self, StorageError> {
        let current = store.get_difficulty(&key)?.unwrap_or(config.default_difficulty);
        let records = store.get_recent_responses(&key, config.window_size)?;
        debug!(target: "difficulty", %key, level = current.value(), restored = records.len(), "Adaptor restored");
        Ok(Self::resume(config, DifficultyProfile::new(key, current), records))
    }

    /// Re-read the stored level and trailing window, picking up writes made by other sessions.
    pub fn reload<S: PerformanceStore + ?Sized>(&mut self, store: &S) -> Result<(), StorageError> {
        let key = self.profile.key.clone();
        if let Some(level) = store.get_difficulty(&key)? {
            self.sync_level(level);
        }
        let records = store.get_recent_responses(&key, self.config.window_size)?;
        self.tracker = PerformanceTracker::from_records(records);
        Ok(())
    }

    pub fn key(&self) -> &StudyKey {
        &self.profile.key
    }

    pub fn config(&self) -> &AdaptorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn profile(&self) -> &DifficultyProfile {
        &self.profile
    }

    pub fn record(&mut self, is_correct: bool, response_time_seconds: f64, difficulty_used: i64) -> Result<(), TutorError> {
        self.tracker.record(is_correct, response_time_seconds, difficulty_used)
    }

    pub fn push(&mut self, record: PerformanceRecord) {
        self.tracker.push(record);
    }

    /// Current level. Never mutates.
    pub fn get_recommended_difficulty(&self) -> Difficulty {
        self.profile.current
    }

    /// Adopt a level written elsewhere (e.g. by a concurrent session for the same key).
    pub fn sync_level(&mut self, level: Difficulty) {
        if level != self.profile.current {
            debug!(target: "difficulty", key = %self.profile.key, from = self.profile.current.value(), to = level.value(), "Adopting stored level");
            self.profile.current = level;
        }
    }

    /// Evaluate the rule without committing anything.
    pub fn decide(&self) -> Decision {
        let observations = self.tracker.len();
        if observations < self.config.min_observations.max(1) {
            return Decision::InsufficientData { observations };
        }
        let Some(accuracy) = self.tracker.recent_accuracy(self.config.window_size) else {
            return Decision::InsufficientData { observations };
        };
        let current = self.profile.current;

        if accuracy >= self.config.raise_threshold {
            if let Some(to) = current.raised() {
                if self.fast_enough() {
                    return Decision::Raise { from: current, to, accuracy };
                }
            }
        } else if accuracy < self.config.lower_threshold {
            if let Some(to) = current.lowered() {
                return Decision::Lower { from: current, to, accuracy };
            }
        }
        Decision::Hold { level: current, accuracy }
    }

    fn fast_enough(&self) -> bool {
        match self.config.max_raise_response_time {
            None => true,
            Some(limit) => self
                .tracker
                .average_response_time(self.config.window_size)
                .map(|t| t < limit)
                .unwrap_or(false),
        }
    }

    /// Preview: would `update_difficulty` change the level right now?
    pub fn should_adjust_difficulty(&self) -> bool {
        self.decide().changes_level()
    }

    /// Commit the current decision. A level change is written through exactly one
    /// `set_difficulty` call; storage errors are returned as-is and leave the in-memory level untouched.
    #[instrument(level = "info", skip(self, store), fields(key = %self.profile.key))]
    pub fn update_difficulty<S: PerformanceStore + ?Sized>(&mut self, store: &S) -> Result<Decision, StorageError> {
        let decision = self.decide();
        let current = self.profile.current;
        let target = Difficulty::clamped(i64::from(decision.target(current)));
        let reason = decision.reason(&self.config);

        if decision.changes_level() {
            store.set_difficulty(&self.profile.key, target, decision.accuracy(), &reason)?;
            self.profile.current = target;
            info!(target: "difficulty", key = %self.profile.key, from = current.value(), to = target.value(), %reason, "Difficulty adjusted");
        } else {
            debug!(target: "difficulty", key = %self.profile.key, level = current.value(), %reason, "Difficulty unchanged");
        }

        let log_it = decision.changes_level() || (self.config.record_holds && matches!(decision, Decision::Hold { .. }));
        if log_it {
            self.profile.history.push(DifficultyChange {
                from: current,
                to: target,
                accuracy: decision.accuracy().unwrap_or(0.0),
                reason,
                timestamp: Utc::now(),
            });
        }
        Ok(decision)
    }

    pub fn performance_report(&self) -> PerformanceReport {
        let current = self.profile.current;
        let decision = self.decide();
        let recommended = decision.target(current);
        PerformanceReport {
            summary: self.tracker.summary(),
            current_difficulty: current,
            current_difficulty_name: current.name(),
            recommended_difficulty: recommended,
            recommended_difficulty_name: recommended.name(),
            should_adjust: decision.changes_level(),
            streak: self.tracker.consecutive_streak(),
        }
    }
}
