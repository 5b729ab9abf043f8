//! Adaptive difficulty behaviour over whole record sequences.
//!
//! - Fixed scenarios for raise, lower, hold and the minimum-observation rule
//! - Store writes happen exactly once per level change
//! - Properties: level stays in 1..=5 and moves by at most one step per update

use std::sync::Mutex;

use proptest::prelude::*;

use toto_backend::domain::{Difficulty, PerformanceRecord, StudyKey};
use toto_backend::store::{NewResponse, StorageError, StorageResult};
use toto_backend::{AdaptorConfig, Decision, DifficultyAdaptor, PerformanceStore, PerformanceTracker};

/// Store double that counts writes and can be told to fail.
#[derive(Default)]
struct RecordingStore {
    level: Mutex<Option<Difficulty>>,
    writes: Mutex<Vec<(Difficulty, String)>>,
    fail_writes: bool,
}

impl PerformanceStore for RecordingStore {
    fn append_response(&self, _response: &NewResponse<'_>) -> StorageResult<i64> {
        Ok(1)
    }

    fn get_recent_responses(&self, _key: &StudyKey, _limit: usize) -> StorageResult<Vec<PerformanceRecord>> {
        Ok(Vec::new())
    }

    fn get_difficulty(&self, _key: &StudyKey) -> StorageResult<Option<Difficulty>> {
        Ok(*self.level.lock().unwrap())
    }

    fn set_difficulty(
        &self,
        _key: &StudyKey,
        new_level: Difficulty,
        _accuracy: Option<f64>,
        reason: &str,
    ) -> StorageResult<()> {
        if self.fail_writes {
            return Err(StorageError::LockError("store offline".into()));
        }
        *self.level.lock().unwrap() = Some(new_level);
        self.writes.lock().unwrap().push((new_level, reason.to_string()));
        Ok(())
    }
}

fn parse(pattern: &str) -> Vec<bool> {
    pattern.split(',').map(|s| s.trim() == "T").collect()
}

fn adaptor_with(level: i64, outcomes: &[bool]) -> DifficultyAdaptor {
    let key = StudyKey::new(1, "P1", "mathematics");
    let mut adaptor = DifficultyAdaptor::new(key, AdaptorConfig::default());
    adaptor.sync_level(Difficulty::new(level).unwrap());
    for ok in outcomes {
        adaptor.record(*ok, 6.0, level).unwrap();
    }
    adaptor
}

#[test]
fn nine_of_ten_raises_medium_to_hard() {
    let store = RecordingStore::default();
    let mut a = adaptor_with(2, &parse("T,T,T,T,T,T,T,T,T,F"));
    assert!(a.should_adjust_difficulty());
    let decision = a.update_difficulty(&store).unwrap();
    assert!(matches!(decision, Decision::Raise { .. }));
    assert_eq!(a.get_recommended_difficulty().value(), 3);
    assert_eq!(store.writes.lock().unwrap().len(), 1);
}

#[test]
fn one_of_ten_lowers_hard_to_medium() {
    let store = RecordingStore::default();
    let mut a = adaptor_with(3, &parse("F,F,F,F,F,T,F,F,F,F"));
    a.update_difficulty(&store).unwrap();
    assert_eq!(a.get_recommended_difficulty().value(), 2);
    assert_eq!(store.level.lock().unwrap().map(Difficulty::value), Some(2));
}

#[test]
fn six_of_ten_holds_and_writes_nothing() {
    let store = RecordingStore::default();
    let mut a = adaptor_with(2, &parse("T,T,F,F,T,T,F,T,F,T"));
    assert!(!a.should_adjust_difficulty());
    let decision = a.update_difficulty(&store).unwrap();
    assert!(matches!(decision, Decision::Hold { .. }));
    assert_eq!(a.get_recommended_difficulty().value(), 2);
    assert!(store.writes.lock().unwrap().is_empty());
}

#[test]
fn two_records_never_adjust() {
    for outcomes in [[true, true], [false, false], [true, false]] {
        let a = adaptor_with(3, &outcomes);
        assert!(!a.should_adjust_difficulty());
        assert_eq!(a.decide(), Decision::InsufficientData { observations: 2 });
    }
}

#[test]
fn bounds_hold_at_both_ends() {
    let store = RecordingStore::default();
    let mut top = adaptor_with(5, &[true; 10]);
    assert!(matches!(top.update_difficulty(&store).unwrap(), Decision::Hold { .. }));
    assert_eq!(top.get_recommended_difficulty(), Difficulty::MAX);

    let mut bottom = adaptor_with(1, &[false; 10]);
    assert!(matches!(bottom.update_difficulty(&store).unwrap(), Decision::Hold { .. }));
    assert_eq!(bottom.get_recommended_difficulty(), Difficulty::MIN);
    assert!(store.writes.lock().unwrap().is_empty());
}

#[test]
fn failed_write_leaves_level_untouched() {
    let store = RecordingStore { fail_writes: true, ..Default::default() };
    let mut a = adaptor_with(2, &[true; 5]);
    assert!(matches!(a.update_difficulty(&store), Err(StorageError::LockError(_))));
    assert_eq!(a.get_recommended_difficulty().value(), 2);
    assert!(a.profile().history.is_empty());
}

#[test]
fn empty_tracker_has_no_accuracy() {
    let t = PerformanceTracker::new();
    assert_eq!(t.recent_accuracy(10), None);
    assert_eq!(t.average_response_time(10), None);
}

#[test]
fn invalid_observations_are_rejected() {
    let mut a = adaptor_with(2, &[]);
    assert!(a.record(true, -0.5, 2).is_err());
    assert!(a.record(true, 3.0, 0).is_err());
    assert!(a.record(true, 3.0, 6).is_err());
    assert!(a.tracker().is_empty());
}

#[test]
fn load_resumes_stored_level() {
    let store = RecordingStore::default();
    *store.level.lock().unwrap() = Some(Difficulty::new(4).unwrap());
    let a = DifficultyAdaptor::load(&store, StudyKey::new(1, "P1", "english"), AdaptorConfig::default()).unwrap();
    assert_eq!(a.get_recommended_difficulty().value(), 4);

    let fresh = RecordingStore::default();
    let a = DifficultyAdaptor::load(&fresh, StudyKey::new(1, "P1", "english"), AdaptorConfig::default()).unwrap();
    assert_eq!(a.get_recommended_difficulty(), Difficulty::MEDIUM);
}

fn arb_outcomes() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..60)
}

proptest! {
    #[test]
    fn level_stays_in_range_and_steps_by_one(start in 1i64..=5, outcomes in arb_outcomes()) {
        let store = RecordingStore::default();
        let key = StudyKey::new(7, "P2", "english");
        let mut a = DifficultyAdaptor::new(key, AdaptorConfig::default());
        a.sync_level(Difficulty::new(start).unwrap());

        for ok in outcomes {
            let before = a.get_recommended_difficulty().value() as i64;
            a.record(ok, 5.0, before).unwrap();
            a.update_difficulty(&store).unwrap();
            let after = a.get_recommended_difficulty().value() as i64;
            prop_assert!((1..=5).contains(&after));
            prop_assert!((after - before).abs() <= 1);
        }
    }

    #[test]
    fn decision_matches_window_accuracy(start in 1i64..=5, outcomes in prop::collection::vec(any::<bool>(), 3..30)) {
        let a = adaptor_with(start, &outcomes);
        let window = &outcomes[outcomes.len().saturating_sub(10)..];
        let accuracy = window.iter().filter(|o| **o).count() as f64 / window.len() as f64;
        let expected = if accuracy >= 0.85 && start < 5 {
            start + 1
        } else if accuracy < 0.60 && start > 1 {
            start - 1
        } else {
            start
        };
        prop_assert_eq!(a.decide().target(a.get_recommended_difficulty()).value() as i64, expected);
    }

    #[test]
    fn writes_only_on_change(outcomes in arb_outcomes()) {
        let store = RecordingStore::default();
        let mut a = adaptor_with(3, &[]);
        let mut changes = 0;
        for ok in outcomes {
            let level = a.get_recommended_difficulty().value() as i64;
            a.record(ok, 5.0, level).unwrap();
            if a.update_difficulty(&store).unwrap().changes_level() {
                changes += 1;
            }
        }
        prop_assert_eq!(store.writes.lock().unwrap().len(), changes);
        prop_assert_eq!(a.profile().history.len(), changes);
    }
}
