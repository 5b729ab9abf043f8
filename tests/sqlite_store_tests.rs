use tempfile::TempDir;

use toto_backend::domain::{Difficulty, PerformanceRecord, StudyKey};
use toto_backend::store::NewResponse;
use toto_backend::{AdaptorConfig, DifficultyAdaptor, PerformanceStore, SqliteStore};

fn answer(store: &SqliteStore, key: &StudyKey, is_correct: bool) {
    let record = PerformanceRecord::observe(is_correct, 3.5, 2).unwrap().with_topic("shapes");
    store
        .append_response(&NewResponse {
            key,
            session_id: None,
            question_id: "q",
            question_text: "Which shape has three sides?",
            expected_answer: "triangle",
            student_answer: if is_correct { "triangle" } else { "square" },
            record: &record,
        })
        .unwrap();
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("toto.db");
    let key;
    {
        let store = SqliteStore::open(&path).unwrap();
        let id = store.add_student("Wasswa", "P3").unwrap();
        key = StudyKey::new(id, "P3", "mathematics");
        for _ in 0..4 {
            answer(&store, &key, true);
        }
        let mut adaptor = DifficultyAdaptor::load(&store, key.clone(), AdaptorConfig::default()).unwrap();
        adaptor.update_difficulty(&store).unwrap();
        assert_eq!(adaptor.get_recommended_difficulty().value(), 3);
    }

    let store = SqliteStore::open(&path).unwrap();
    assert!(path.exists());
    assert_eq!(store.get_difficulty(&key).unwrap(), Some(Difficulty::new(3).unwrap()));
    let restored = DifficultyAdaptor::load(&store, key.clone(), AdaptorConfig::default()).unwrap();
    assert_eq!(restored.tracker().len(), 4);
    assert_eq!(restored.get_recommended_difficulty().value(), 3);

    let profile = store.get_difficulty_profile(&key).unwrap().unwrap();
    assert_eq!(profile.history.len(), 1);
    assert_eq!(profile.history[0].from.value(), 2);
    assert_eq!(profile.history[0].to.value(), 3);
}

#[test]
fn test_recent_responses_window_across_keys() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("toto.db")).unwrap();
    let id = store.add_student("Auma", "P1").unwrap();
    let maths = StudyKey::new(id, "P1", "mathematics");
    let english = StudyKey::new(id, "P1", "english");

    for i in 0..12 {
        answer(&store, &maths, i % 3 != 0);
    }
    answer(&store, &english, false);

    let recent = store.get_recent_responses(&maths, 10).unwrap();
    assert_eq!(recent.len(), 10);
    assert!(recent.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(store.get_recent_responses(&english, 10).unwrap().len(), 1);
    assert_eq!(recent[0].topic.as_deref(), Some("shapes"));
}
