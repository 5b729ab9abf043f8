//! Toto Fryn tutoring backend.
//!
//! Core: `tracker` (rolling statistics), `adaptor` (difficulty 1..=5 driven by
//! trailing-window accuracy) and `analyzer` (trajectory and weak areas).
//! Around it: SQLite persistence, curriculum catalogue, sessions, analytics,
//! an OpenAI-compatible question service and the axum HTTP API.

pub mod adaptor;
pub mod analytics;
pub mod analyzer;
pub mod config;
pub mod curriculum;
pub mod domain;
pub mod error;
pub mod llm;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod tracker;
pub mod util;

pub use adaptor::{AdaptorConfig, Decision, DifficultyAdaptor};
pub use analyzer::PerformanceAnalyzer;
pub use domain::{Difficulty, PerformanceRecord, StudyKey};
pub use error::{TutorError, TutorResult};
pub use store::{PerformanceStore, SqliteStore, StorageError};
pub use tracker::PerformanceTracker;
