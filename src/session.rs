//! One sitting of a student working a theme: present a question, take the answer,
//! record it, let the adaptor move the level, and summarise at the end.
//!
//! A session never talks to the question service itself. Callers generate the
//! question (and optionally an external verdict) and hand them in.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::adaptor::{AdaptorConfig, Decision, DifficultyAdaptor, PerformanceReport};
use crate::analyzer::{PerformanceAnalyzer, TopicAttempt, TopicStat, TrajectoryReport, DEFAULT_WEAK_THRESHOLD};
use crate::curriculum::Curriculum;
use crate::domain::{
  Difficulty, PerformanceRecord, Question, Streak, StudyKey, ThemeProgress, TopicMastery, Verdict,
};
use crate::error::{TutorError, TutorResult};
use crate::llm::QuestionRequest;
use crate::store::{NewResponse, PerformanceStore, SqliteStore};
use crate::tracker::PerformanceTracker;
use crate::util::{digits_of, normalize_answer};

const PRAISE: &[&str] = &[
  "Well done!",
  "Excellent work!",
  "That's right, keep going!",
  "Great thinking!",
  "You got it!",
];

/// Weakest topics listed in a session summary.
const SUMMARY_WEAK_TOPICS: usize = 3;

#[derive(Clone, Debug)]
struct PendingQuestion {
  question: Question,
  presented_at: Instant,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnswerOutcome {
  pub is_correct: bool,
  pub expected_answer: String,
  pub feedback: String,
  pub response_time_seconds: f64,
  pub difficulty_before: Difficulty,
  pub difficulty_after: Difficulty,
  /// Set only when the adaptor committed a decision for this answer.
  pub decision: Option<Decision>,
  pub theme_progress: ThemeProgress,
  pub topic_mastery: TopicMastery,
  pub session_accuracy: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionProgress {
  pub session_id: i64,
  pub student_id: i64,
  pub level: String,
  pub subject: String,
  pub theme: String,
  pub questions_answered: usize,
  pub correct_answers: usize,
  pub accuracy: f64,
  pub current_difficulty: Difficulty,
  pub difficulty_name: &'static str,
  pub has_pending_question: bool,
  pub streak: Option<Streak>,
  pub started_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
  pub session_id: i64,
  pub student_id: i64,
  pub level: String,
  pub subject: String,
  pub theme: String,
  pub questions_answered: usize,
  pub correct_answers: usize,
  pub accuracy: f64,
  pub duration_seconds: Option<i64>,
  pub performance: PerformanceReport,
  pub trajectory: Option<TrajectoryReport>,
  /// Per-topic results for this session only.
  pub topic_breakdown: Vec<TopicStat>,
  pub weakest_topics: Vec<TopicMastery>,
  pub review_suggestions: Vec<String>,
  pub next_theme: Option<String>,
}

#[derive(Debug)]
pub struct LearningSession {
  session_id: i64,
  theme: String,
  adaptor: DifficultyAdaptor,
  pending: Option<PendingQuestion>,
  attempts: Vec<TopicAttempt>,
  /// Answers given in this session. The adaptor's tracker follows the whole key instead.
  history: PerformanceTracker,
  started_at: DateTime<Utc>,
}

impl LearningSession {
  /// Validate the selection, open the session row and restore the adaptor for the key.
  #[instrument(level = "info", skip(store, curriculum, config))]
  pub fn start(
    store: &SqliteStore,
    curriculum: &Curriculum,
    config: &AdaptorConfig,
    student_id: i64,
    level: &str,
    subject: &str,
    theme: &str,
  ) -> TutorResult<Self> {
    let key = StudyKey::new(student_id, level, subject);
    if !curriculum.is_valid_level(&key.level) {
      return Err(TutorError::InvalidCurriculum(format!("unknown level '{}'", key.level)));
    }
    if !curriculum.is_valid_subject(&key.level, &key.subject) {
      return Err(TutorError::InvalidCurriculum(format!("{} has no subject '{}'", key.level, key.subject)));
    }
    if !curriculum.is_valid_theme(&key.level, &key.subject, theme) {
      return Err(TutorError::InvalidCurriculum(format!(
        "theme '{}' is not part of {} {}",
        theme, key.level, key.subject
      )));
    }
    if store.get_student(student_id)?.is_none() {
      return Err(TutorError::NotFound(format!("student {}", student_id)));
    }
    store.update_last_active(student_id)?;

    let session_id = store.create_session(&key, theme)?;
    let adaptor = DifficultyAdaptor::load(store, key, config.clone())?;
    info!(
      target: "session",
      session_id,
      key = %adaptor.key(),
      difficulty = adaptor.get_recommended_difficulty().value(),
      restored = adaptor.tracker().len(),
      "Session started"
    );

    Ok(Self {
      session_id,
      theme: theme.to_string(),
      adaptor,
      pending: None,
      attempts: Vec::new(),
      history: PerformanceTracker::new(),
      started_at: Utc::now(),
    })
  }

  pub fn id(&self) -> i64 { self.session_id }
  pub fn key(&self) -> &StudyKey { self.adaptor.key() }
  pub fn theme(&self) -> &str { &self.theme }
  pub fn adaptor(&self) -> &DifficultyAdaptor { &self.adaptor }

  pub fn current_difficulty(&self) -> Difficulty {
    self.adaptor.get_recommended_difficulty()
  }

  /// What to ask the question service for next.
  pub fn question_request<'a>(&'a self, competences: &'a [String]) -> QuestionRequest<'a> {
    let key = self.adaptor.key();
    QuestionRequest {
      level: &key.level,
      subject: &key.subject,
      theme: &self.theme,
      competences,
      difficulty: self.current_difficulty(),
    }
  }

  /// Make `question` the pending one and start its timer. Replaces any unanswered question.
  pub fn present(&mut self, question: Question) {
    if let Some(prev) = &self.pending {
      debug!(target: "session", session_id = self.session_id, replaced = %prev.question.id, "Unanswered question replaced");
    }
    debug!(target: "session", session_id = self.session_id, question_id = %question.id, difficulty = question.difficulty.value(), "Question presented");
    self.pending = Some(PendingQuestion { question, presented_at: Instant::now() });
  }

  pub fn pending_question(&self) -> Option<&Question> {
    self.pending.as_ref().map(|p| &p.question)
  }

  pub fn hint(&self) -> TutorResult<String> {
    let q = self.pending_question().ok_or(TutorError::NoPendingQuestion)?;
    if q.hint.trim().is_empty() {
      Ok(format!("Read the question again slowly and think about {}.", q.topic))
    } else {
      Ok(q.hint.clone())
    }
  }

  /// Adopt the level and trailing window written by other sessions for the same key.
  pub fn refresh(&mut self, store: &SqliteStore) -> TutorResult<()> {
    self.adaptor.reload(store)?;
    Ok(())
  }

  /// Answer the pending question, timing it from when it was presented.
  pub fn submit_answer(&mut self, store: &SqliteStore, answer: &str, verdict: Option<Verdict>) -> TutorResult<AnswerOutcome> {
    let elapsed = self
      .pending
      .as_ref()
      .map(|p| p.presented_at.elapsed().as_secs_f64())
      .ok_or(TutorError::NoPendingQuestion)?;
    self.submit_answer_timed(store, answer, verdict, elapsed)
  }

  #[instrument(level = "info", skip(self, store, answer, verdict), fields(session_id = self.session_id, answer_len = answer.len()))]
  pub fn submit_answer_timed(
    &mut self,
    store: &SqliteStore,
    answer: &str,
    verdict: Option<Verdict>,
    response_time_seconds: f64,
  ) -> TutorResult<AnswerOutcome> {
    let question = self
      .pending
      .as_ref()
      .map(|p| p.question.clone())
      .ok_or(TutorError::NoPendingQuestion)?;

    let (is_correct, external_feedback) = match verdict {
      Some(v) => (v.is_correct, v.feedback),
      None => (check_answer(answer, &question.expected_answer), None),
    };
    let record = PerformanceRecord::observe(is_correct, response_time_seconds, i64::from(question.difficulty))?
      .with_topic(question.topic.clone());

    let key = self.adaptor.key().clone();
    let stored = store.record_answer(
      &NewResponse {
        key: &key,
        session_id: Some(self.session_id),
        question_id: &question.id,
        question_text: &question.text,
        expected_answer: &question.expected_answer,
        student_answer: answer,
        record: &record,
      },
      &self.theme,
    )?;
    // Only a stored answer consumes the question.
    self.pending = None;

    self.attempts.push(TopicAttempt { topic: question.topic.clone(), is_correct });
    self.history.push(record.clone());
    let before = self.adaptor.get_recommended_difficulty();
    self.adaptor.push(record);
    // A failed level write leaves the level as it was; the next answer decides again.
    let decision = if self.adaptor.should_adjust_difficulty() {
      Some(self.adaptor.update_difficulty(store)?)
    } else {
      None
    };
    let after = self.adaptor.get_recommended_difficulty();
    let feedback = feedback_for(is_correct, &question, external_feedback);
    info!(
      target: "session",
      session_id = self.session_id,
      %key,
      is_correct,
      response_time = response_time_seconds,
      from = before.value(),
      to = after.value(),
      "Answer recorded"
    );

    Ok(AnswerOutcome {
      is_correct,
      expected_answer: question.expected_answer,
      feedback,
      response_time_seconds,
      difficulty_before: before,
      difficulty_after: after,
      decision,
      theme_progress: stored.theme_progress,
      topic_mastery: stored.topic_mastery,
      session_accuracy: self.accuracy(),
    })
  }

  fn accuracy(&self) -> f64 {
    self.history.summary().accuracy
  }

  fn correct_answers(&self) -> usize {
    self.history.records().iter().filter(|r| r.is_correct).count()
  }

  pub fn progress(&self) -> SessionProgress {
    let key = self.adaptor.key();
    let current = self.current_difficulty();
    SessionProgress {
      session_id: self.session_id,
      student_id: key.student_id,
      level: key.level.clone(),
      subject: key.subject.clone(),
      theme: self.theme.clone(),
      questions_answered: self.history.len(),
      correct_answers: self.correct_answers(),
      accuracy: self.accuracy(),
      current_difficulty: current,
      difficulty_name: current.name(),
      has_pending_question: self.pending.is_some(),
      streak: self.history.consecutive_streak(),
      started_at: self.started_at,
    }
  }

  /// Close the session row and build the end-of-session summary.
  #[instrument(level = "info", skip(self, store, curriculum), fields(session_id = self.session_id))]
  pub fn end(&mut self, store: &SqliteStore, curriculum: &Curriculum) -> TutorResult<SessionSummary> {
    let record = store.end_session(self.session_id)?;
    self.pending = None;

    let key = self.adaptor.key().clone();
    let mut weakest = store.get_weak_topics(&key, DEFAULT_WEAK_THRESHOLD)?;
    weakest.truncate(SUMMARY_WEAK_TOPICS);
    let weak_names: Vec<String> = weakest.iter().map(|t| t.topic.clone()).collect();
    let review_suggestions = curriculum.suggest_review_areas(&key.level, &key.subject, &weak_names);
    let next_theme = curriculum.recommended_next_theme(&key.level, &key.subject, &self.theme);
    let window = self.adaptor.config().window_size;
    let analyzer = PerformanceAnalyzer::new(window);
    // Two stored windows for the key, the same history the subject analysis reads.
    let trajectory = analyzer.classify(&store.get_recent_responses(&key, window * 2)?);
    let topic_breakdown = analyzer.summarize_topics(&self.attempts);
    let mut performance = self.adaptor.performance_report();
    performance.summary = self.history.summary();
    performance.streak = self.history.consecutive_streak();

    info!(
      target: "session",
      session_id = self.session_id,
      %key,
      answered = self.history.len(),
      correct = self.correct_answers(),
      duration = ?record.duration_seconds,
      "Session ended"
    );

    Ok(SessionSummary {
      session_id: self.session_id,
      student_id: key.student_id,
      level: key.level.clone(),
      subject: key.subject.clone(),
      theme: self.theme.clone(),
      questions_answered: self.history.len(),
      correct_answers: self.correct_answers(),
      accuracy: self.accuracy(),
      duration_seconds: record.duration_seconds,
      performance,
      trajectory,
      topic_breakdown,
      weakest_topics: weakest,
      review_suggestions,
      next_theme,
    })
  }
}

/// Local answer check: case-insensitive exact match, or the same digits when the expected answer has any.
pub fn check_answer(answer: &str, expected: &str) -> bool {
  let a = normalize_answer(answer);
  let e = normalize_answer(expected);
  if a.is_empty() {
    return false;
  }
  if a == e {
    return true;
  }
  let expected_digits = digits_of(&e);
  !expected_digits.is_empty() && digits_of(&a) == expected_digits
}

fn feedback_for(is_correct: bool, question: &Question, external: Option<String>) -> String {
  let extra = external.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
  if is_correct {
    let praise = PRAISE.choose(&mut rand::thread_rng()).copied().unwrap_or("Well done!");
    match extra {
      Some(f) => format!("{} {}", praise, f),
      None => praise.to_string(),
    }
  } else {
    match extra {
      Some(f) => f,
      None => format!("Not quite. The answer is {}.", question.expected_answer),
    }
  }
}
