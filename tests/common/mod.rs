use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;

use toto_backend::config::TutorConfig;
use toto_backend::curriculum::{Curriculum, SubjectCurriculum, Theme};
use toto_backend::routes::build_router;
use toto_backend::state::AppState;
use toto_backend::SqliteStore;

pub fn sample_curriculum() -> Curriculum {
    let mut c = Curriculum::default();
    c.insert(
        "P1",
        "mathematics",
        SubjectCurriculum {
            themes: vec![
                Theme { name: "Numbers".into(), competences: vec!["Reads numbers up to 20".into()] },
                Theme { name: "Addition".into(), competences: vec!["Adds numbers up to 10".into()] },
            ],
            learning_outcomes: vec!["Counts and adds small numbers".into()],
        },
    );
    c
}

/// Router over an in-memory store with no model configured.
pub fn create_test_app() -> (Router, Arc<AppState>) {
    let store = SqliteStore::in_memory().expect("in-memory store");
    let state = Arc::new(AppState::from_parts(store, sample_curriculum(), None, TutorConfig::default()));
    (build_router(state.clone()), state)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
