//! Domain models: difficulty scale, study keys, performance records, profiles and questions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TutorError;

/// Question complexity on a closed 1..=5 scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Difficulty(u8);

impl Difficulty {
  pub const MIN: Difficulty = Difficulty(1);
  pub const MAX: Difficulty = Difficulty(5);
  pub const EASY: Difficulty = Difficulty(1);
  pub const MEDIUM: Difficulty = Difficulty(2);

  pub fn new(level: i64) -> Result<Self, TutorError> {
    if (1..=5).contains(&level) {
      Ok(Difficulty(level as u8))
    } else {
      Err(TutorError::InvalidObservation(format!("difficulty {} outside 1..=5", level)))
    }
  }

  /// Saturating constructor, used where out-of-range values must be coerced rather than rejected.
  pub fn clamped(level: i64) -> Self {
    Difficulty(level.clamp(1, 5) as u8)
  }

  pub fn value(self) -> u8 { self.0 }

  pub fn name(self) -> &'static str {
    match self.0 {
      1 => "Easy",
      2 => "Medium",
      3 => "Hard",
      4 => "Expert",
      _ => "Mastery",
    }
  }

  pub fn description(self) -> &'static str {
    match self.0 {
      1 => "Simple, direct questions",
      2 => "Standard questions with minor complexity",
      3 => "Complex questions requiring reasoning",
      4 => "Advanced problems with multiple steps",
      _ => "Challenging problems requiring synthesis",
    }
  }

  /// One step up, `None` at the top of the scale.
  pub fn raised(self) -> Option<Self> {
    if self < Self::MAX { Some(Difficulty(self.0 + 1)) } else { None }
  }

  /// One step down, `None` at the bottom of the scale.
  pub fn lowered(self) -> Option<Self> {
    if self > Self::MIN { Some(Difficulty(self.0 - 1)) } else { None }
  }
}

impl Default for Difficulty {
  fn default() -> Self { Self::MEDIUM }
}

impl TryFrom<i64> for Difficulty {
  type Error = TutorError;
  fn try_from(v: i64) -> Result<Self, Self::Error> { Difficulty::new(v) }
}

impl From<Difficulty> for i64 {
  fn from(d: Difficulty) -> i64 { d.0 as i64 }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.0, self.name())
  }
}

/// One adaptive stream: a student working a subject at a curriculum level.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyKey {
  pub student_id: i64,
  pub level: String,
  pub subject: String,
}

impl StudyKey {
  pub fn new(student_id: i64, level: &str, subject: &str) -> Self {
    Self {
      student_id,
      level: level.trim().to_uppercase(),
      subject: subject.trim().to_lowercase(),
    }
  }
}

impl fmt::Display for StudyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.student_id, self.level, self.subject)
  }
}

/// A single answered question. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
  pub is_correct: bool,
  pub response_time_seconds: f64,
  pub difficulty_used: Difficulty,
  pub timestamp: DateTime<Utc>,
  #[serde(default)] pub topic: Option<String>,
}

impl PerformanceRecord {
  /// Validates the raw observation before it becomes a record.
  pub fn observe(is_correct: bool, response_time_seconds: f64, difficulty_used: i64) -> Result<Self, TutorError> {
    if !response_time_seconds.is_finite() || response_time_seconds < 0.0 {
      return Err(TutorError::InvalidObservation(format!(
        "response time {} must be a non-negative number of seconds",
        response_time_seconds
      )));
    }
    Ok(Self {
      is_correct,
      response_time_seconds,
      difficulty_used: Difficulty::new(difficulty_used)?,
      timestamp: Utc::now(),
      topic: None,
    })
  }

  pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
    self.topic = Some(topic.into());
    self
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Correct,
  Incorrect,
}

impl From<bool> for Outcome {
  fn from(is_correct: bool) -> Self {
    if is_correct { Outcome::Correct } else { Outcome::Incorrect }
  }
}

/// Trailing run of identical outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Streak {
  pub outcome: Outcome,
  pub length: usize,
}

/// A committed (or, optionally, held) difficulty decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultyChange {
  pub from: Difficulty,
  pub to: Difficulty,
  pub accuracy: f64,
  pub reason: String,
  pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
  pub key: StudyKey,
  pub current: Difficulty,
  #[serde(default)] pub history: Vec<DifficultyChange>,
}

impl DifficultyProfile {
  pub fn new(key: StudyKey, current: Difficulty) -> Self {
    Self { key, current, history: Vec::new() }
  }
}

/// Learning trajectory label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trajectory {
  Struggling,
  Improving,
  Stable,
  Proficient,
  Mastering,
}

/// Per-topic mastery band used in topic breakdowns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryStatus {
  Beginning,
  Developing,
  Proficient,
  Mastered,
}

impl MasteryStatus {
  pub fn from_accuracy(accuracy_pct: f64) -> Self {
    if accuracy_pct >= 90.0 {
      MasteryStatus::Mastered
    } else if accuracy_pct >= 70.0 {
      MasteryStatus::Proficient
    } else if accuracy_pct >= 50.0 {
      MasteryStatus::Developing
    } else {
      MasteryStatus::Beginning
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      MasteryStatus::Beginning => "beginning",
      MasteryStatus::Developing => "developing",
      MasteryStatus::Proficient => "proficient",
      MasteryStatus::Mastered => "mastered",
    }
  }
}

/// Stored aggregate correctness for one topic, maintained by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicMastery {
  pub topic: String,
  pub mastery_percentage: f64,
  pub attempts: i64,
  pub correct_attempts: i64,
  pub status: String,
  #[serde(default)] pub last_practiced: Option<DateTime<Utc>>,
}

/// Stored aggregate correctness for one curriculum theme.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThemeProgress {
  pub theme: String,
  pub total_attempts: i64,
  pub correct_attempts: i64,
  pub accuracy_rate: f64,
  #[serde(default)] pub last_attempted: Option<DateTime<Utc>>,
  pub mastery_status: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Student {
  pub student_id: i64,
  pub name: String,
  pub grade: String,
  pub date_created: DateTime<Utc>,
  #[serde(default)] pub last_active: Option<DateTime<Utc>>,
}

/// Shape of a generated question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  #[default]
  ShortAnswer,
  MultipleChoice,
  WordProblem,
  FillInBlank,
  #[serde(other)]
  Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub text: String,
  pub expected_answer: String,
  #[serde(default)] pub hint: String,
  #[serde(default)] pub kind: QuestionKind,
  pub difficulty: Difficulty,
  /// Opaque curriculum label the answer is tallied under.
  pub topic: String,
}

/// Outcome of asking the question service for a new item. Callers must handle both arms.
#[derive(Clone, Debug, PartialEq)]
pub enum Generation {
  Generated(Question),
  Failed(String),
}

/// Correctness judgement produced outside the session (e.g. by the evaluator model).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
  pub is_correct: bool,
  #[serde(default)] pub feedback: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_rejects_out_of_range() {
    assert!(Difficulty::new(0).is_err());
    assert!(Difficulty::new(6).is_err());
    assert_eq!(Difficulty::new(3).unwrap().value(), 3);
    assert_eq!(Difficulty::clamped(9), Difficulty::MAX);
    assert_eq!(Difficulty::clamped(-2), Difficulty::MIN);
  }

  #[test]
  fn difficulty_steps_saturate_at_bounds() {
    assert_eq!(Difficulty::MAX.raised(), None);
    assert_eq!(Difficulty::MIN.lowered(), None);
    assert_eq!(Difficulty::MEDIUM.raised().map(Difficulty::value), Some(3));
    assert_eq!(Difficulty::MEDIUM.name(), "Medium");
  }

  #[test]
  fn difficulty_serializes_as_integer() {
    let json = serde_json::to_string(&Difficulty::new(4).unwrap()).unwrap();
    assert_eq!(json, "4");
    assert!(serde_json::from_str::<Difficulty>("7").is_err());
  }

  #[test]
  fn observation_rejects_negative_time() {
    assert!(matches!(
      PerformanceRecord::observe(true, -1.0, 2),
      Err(TutorError::InvalidObservation(_))
    ));
    assert!(PerformanceRecord::observe(true, f64::NAN, 2).is_err());
    assert!(PerformanceRecord::observe(true, 0.0, 2).is_ok());
  }

  #[test]
  fn study_key_normalises_labels() {
    let k = StudyKey::new(7, " p2", "Mathematics ");
    assert_eq!(k.level, "P2");
    assert_eq!(k.subject, "mathematics");
    assert_eq!(k.to_string(), "7/P2/mathematics");
  }

  #[test]
  fn unknown_question_kind_maps_to_other() {
    let k: QuestionKind = serde_json::from_str("\"riddle\"").unwrap();
    assert_eq!(k, QuestionKind::Other);
  }
}
