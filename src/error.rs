//! Error types shared by the tutoring core and the HTTP layer.

use thiserror::Error;

use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum TutorError {
  /// Malformed observation: negative/non-finite response time or a difficulty outside 1..=5.
  #[error("invalid observation: {0}")]
  InvalidObservation(String),

  /// Storage failures are passed through untouched.
  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid curriculum selection: {0}")]
  InvalidCurriculum(String),

  #[error("no question is pending in this session")]
  NoPendingQuestion,

  #[error("question generation failed: {0}")]
  Generation(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type TutorResult<T> = Result<T, TutorError>;
