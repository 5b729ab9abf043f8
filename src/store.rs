//! SQLite persistence.
//!
//! `PerformanceStore` is the narrow contract the adaptive core depends on; `SqliteStore`
//! implements it together with the bookkeeping tables used by sessions and analytics
//! (students, sessions, theme progress, topic mastery).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::domain::{
    Difficulty, DifficultyChange, DifficultyProfile, MasteryStatus, PerformanceRecord, Student, StudyKey,
    ThemeProgress, TopicMastery,
};
use crate::tracker::round2;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("failed to acquire connection lock: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    student_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    grade        TEXT NOT NULL,
    date_created TEXT NOT NULL,
    last_active  TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id       INTEGER NOT NULL REFERENCES students(student_id),
    level            TEXT NOT NULL,
    subject          TEXT NOT NULL,
    theme            TEXT NOT NULL,
    start_time       TEXT NOT NULL,
    end_time         TEXT,
    duration_seconds INTEGER
);

CREATE TABLE IF NOT EXISTS responses (
    response_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id            INTEGER REFERENCES sessions(session_id),
    student_id            INTEGER NOT NULL,
    level                 TEXT NOT NULL,
    subject               TEXT NOT NULL,
    topic                 TEXT,
    question_id           TEXT NOT NULL,
    question_text         TEXT NOT NULL,
    expected_answer       TEXT,
    student_answer        TEXT,
    is_correct            INTEGER NOT NULL,
    difficulty_level      INTEGER NOT NULL,
    response_time_seconds REAL NOT NULL,
    timestamp             TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_responses_key
    ON responses (student_id, level, subject, response_id);

CREATE TABLE IF NOT EXISTS progress (
    progress_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id       INTEGER NOT NULL REFERENCES students(student_id),
    level            TEXT NOT NULL,
    subject          TEXT NOT NULL,
    theme            TEXT NOT NULL,
    total_attempts   INTEGER NOT NULL DEFAULT 0,
    correct_attempts INTEGER NOT NULL DEFAULT 0,
    accuracy_rate    REAL NOT NULL DEFAULT 0.0,
    last_attempted   TEXT,
    mastery_status   TEXT NOT NULL DEFAULT 'beginning',
    UNIQUE (student_id, level, subject, theme)
);

CREATE TABLE IF NOT EXISTS topic_mastery (
    mastery_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id         INTEGER NOT NULL REFERENCES students(student_id),
    level              TEXT NOT NULL,
    subject            TEXT NOT NULL,
    topic              TEXT NOT NULL,
    mastery_percentage REAL NOT NULL DEFAULT 0.0,
    attempts           INTEGER NOT NULL DEFAULT 0,
    correct_attempts   INTEGER NOT NULL DEFAULT 0,
    last_practiced     TEXT,
    status             TEXT NOT NULL DEFAULT 'not_started',
    UNIQUE (student_id, level, subject, topic)
);

CREATE TABLE IF NOT EXISTS difficulty_profile (
    profile_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id           INTEGER NOT NULL,
    level                TEXT NOT NULL,
    subject              TEXT NOT NULL,
    current_difficulty   INTEGER NOT NULL,
    recent_accuracy      REAL,
    adjustment_timestamp TEXT NOT NULL,
    UNIQUE (student_id, level, subject)
);

CREATE TABLE IF NOT EXISTS difficulty_history (
    history_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id      INTEGER NOT NULL,
    level           TEXT NOT NULL,
    subject         TEXT NOT NULL,
    from_difficulty INTEGER NOT NULL,
    to_difficulty   INTEGER NOT NULL,
    accuracy        REAL,
    reason          TEXT NOT NULL,
    timestamp       TEXT NOT NULL
);
"#;

/// Storage contract consumed by the adaptive core.
pub trait PerformanceStore {
    fn append_response(&self, response: &NewResponse<'_>) -> StorageResult<i64>;

    /// Up to `limit` most recent records for the key, oldest first.
    fn get_recent_responses(&self, key: &StudyKey, limit: usize) -> StorageResult<Vec<PerformanceRecord>>;

    fn get_difficulty(&self, key: &StudyKey) -> StorageResult<Option<Difficulty>>;

    fn set_difficulty(
        &self,
        key: &StudyKey,
        new_level: Difficulty,
        accuracy: Option<f64>,
        reason: &str,
    ) -> StorageResult<()>;
}

/// A response row as written by a session.
#[derive(Debug, Clone)]
pub struct NewResponse<'a> {
    pub key: &'a StudyKey,
    pub session_id: Option<i64>,
    pub question_id: &'a str,
    pub question_text: &'a str,
    pub expected_answer: &'a str,
    pub student_answer: &'a str,
    pub record: &'a PerformanceRecord,
}

/// What `record_answer` wrote.
#[derive(Debug, Clone)]
pub struct RecordedAnswer {
    pub response_id: i64,
    pub theme_progress: ThemeProgress,
    pub topic_mastery: TopicMastery,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: i64,
    pub student_id: i64,
    pub level: String,
    pub subject: String,
    pub theme: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file, creating its parent directory if needed.
    #[instrument(level = "info", skip_all, fields(path = %db_path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        let store = Self { connection: Mutex::new(connection) };
        store.initialize()?;
        info!(target: "toto_backend", path = %path.display(), "SQLite store ready");
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> StorageResult<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { connection: Mutex::new(connection) };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> StorageResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    // ========== students ==========

    pub fn add_student(&self, name: &str, grade: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO students (name, grade, date_created) VALUES (?1, ?2, ?3)",
            params![name, grade.trim().to_uppercase(), Utc::now()],
        )?;
        let id = conn.last_insert_rowid();
        debug!(target: "toto_backend", student_id = id, "Student created");
        Ok(id)
    }

    pub fn get_student(&self, student_id: i64) -> StorageResult<Option<Student>> {
        let conn = self.conn()?;
        let student = conn
            .query_row(
                "SELECT student_id, name, grade, date_created, last_active FROM students WHERE student_id = ?1",
                params![student_id],
                |row| {
                    Ok(Student {
                        student_id: row.get("student_id")?,
                        name: row.get("name")?,
                        grade: row.get("grade")?,
                        date_created: row.get("date_created")?,
                        last_active: row.get("last_active")?,
                    })
                },
            )
            .optional()?;
        Ok(student)
    }

    pub fn update_last_active(&self, student_id: i64) -> StorageResult<()> {
        let changed = self.conn()?.execute(
            "UPDATE students SET last_active = ?1 WHERE student_id = ?2",
            params![Utc::now(), student_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("student {}", student_id)));
        }
        Ok(())
    }

    // ========== sessions ==========

    pub fn create_session(&self, key: &StudyKey, theme: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (student_id, level, subject, theme, start_time) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.student_id, key.level, key.subject, theme, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Stamp the end time and store the elapsed seconds.
    pub fn end_session(&self, session_id: i64) -> StorageResult<SessionRecord> {
        let conn = self.conn()?;
        let start: Option<DateTime<Utc>> = conn
            .query_row(
                "SELECT start_time FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        let start = start.ok_or_else(|| StorageError::NotFound(format!("session {}", session_id)))?;
        let now = Utc::now();
        let duration = (now - start).num_seconds().max(0);
        conn.execute(
            "UPDATE sessions SET end_time = ?1, duration_seconds = ?2 WHERE session_id = ?3",
            params![now, duration, session_id],
        )?;
        let session = conn.query_row(
            "SELECT * FROM sessions WHERE session_id = ?1",
            params![session_id],
            session_from_row,
        )?;
        Ok(session)
    }

    // ========== progress & mastery ==========

    /// Count one attempt against a curriculum theme.
    pub fn update_progress(&self, key: &StudyKey, theme: &str, is_correct: bool) -> StorageResult<ThemeProgress> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let progress = upsert_progress(&tx, key, theme, is_correct)?;
        tx.commit()?;
        Ok(progress)
    }

    /// Count one attempt against a topic and refresh its mastery percentage.
    pub fn update_topic_mastery(&self, key: &StudyKey, topic: &str, is_correct: bool) -> StorageResult<TopicMastery> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mastery = upsert_topic_mastery(&tx, key, topic, is_correct)?;
        tx.commit()?;
        Ok(mastery)
    }

    /// Store an answered question in one transaction: the response row, its theme
    /// progress and its topic mastery. Nothing is written if any part fails.
    #[instrument(level = "debug", skip(self, response), fields(key = %response.key))]
    pub fn record_answer(&self, response: &NewResponse<'_>, theme: &str) -> StorageResult<RecordedAnswer> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let response_id = insert_response(&tx, response)?;
        let is_correct = response.record.is_correct;
        let theme_progress = upsert_progress(&tx, response.key, theme, is_correct)?;
        let topic = response.record.topic.as_deref().unwrap_or(theme);
        let topic_mastery = upsert_topic_mastery(&tx, response.key, topic, is_correct)?;
        tx.commit()?;
        debug!(target: "toto_backend", response_id, is_correct, "Answer stored");
        Ok(RecordedAnswer { response_id, theme_progress, topic_mastery })
    }

    /// Theme progress for a key, ordered by theme name.
    pub fn get_progress(&self, key: &StudyKey) -> StorageResult<Vec<ThemeProgress>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT theme, total_attempts, correct_attempts, accuracy_rate, last_attempted, mastery_status
             FROM progress WHERE student_id = ?1 AND level = ?2 AND subject = ?3
             ORDER BY theme",
        )?;
        let rows = stmt
            .query_map(params![key.student_id, key.level, key.subject], |row| {
                Ok(ThemeProgress {
                    theme: row.get("theme")?,
                    total_attempts: row.get("total_attempts")?,
                    correct_attempts: row.get("correct_attempts")?,
                    accuracy_rate: row.get("accuracy_rate")?,
                    last_attempted: row.get("last_attempted")?,
                    mastery_status: row.get("mastery_status")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Topic mastery for a key, strongest first.
    pub fn get_topic_mastery(&self, key: &StudyKey) -> StorageResult<Vec<TopicMastery>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT topic, mastery_percentage, attempts, correct_attempts, status, last_practiced
             FROM topic_mastery WHERE student_id = ?1 AND level = ?2 AND subject = ?3
             ORDER BY mastery_percentage DESC, topic",
        )?;
        let rows = stmt
            .query_map(params![key.student_id, key.level, key.subject], mastery_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Topics under `threshold` percent, weakest first.
    pub fn get_weak_topics(&self, key: &StudyKey, threshold: f64) -> StorageResult<Vec<TopicMastery>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT topic, mastery_percentage, attempts, correct_attempts, status, last_practiced
             FROM topic_mastery
             WHERE student_id = ?1 AND level = ?2 AND subject = ?3 AND mastery_percentage < ?4
             ORDER BY mastery_percentage ASC, topic",
        )?;
        let rows = stmt
            .query_map(params![key.student_id, key.level, key.subject, threshold], mastery_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every (level, subject) pair the student has progress rows for.
    pub fn studied_keys(&self, student_id: i64) -> StorageResult<Vec<StudyKey>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT level, subject FROM progress WHERE student_id = ?1 ORDER BY level, subject",
        )?;
        let keys = stmt
            .query_map(params![student_id], |row| {
                let level: String = row.get(0)?;
                let subject: String = row.get(1)?;
                Ok(StudyKey::new(student_id, &level, &subject))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    // ========== difficulty ==========

    /// Current level plus the full adjustment history, `None` before the first adjustment.
    pub fn get_difficulty_profile(&self, key: &StudyKey) -> StorageResult<Option<DifficultyProfile>> {
        let Some(current) = self.get_difficulty(key)? else {
            return Ok(None);
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT from_difficulty, to_difficulty, accuracy, reason, timestamp FROM difficulty_history
             WHERE student_id = ?1 AND level = ?2 AND subject = ?3
             ORDER BY history_id",
        )?;
        let history = stmt
            .query_map(params![key.student_id, key.level, key.subject], |row| {
                let from: i64 = row.get("from_difficulty")?;
                let to: i64 = row.get("to_difficulty")?;
                let accuracy: Option<f64> = row.get("accuracy")?;
                Ok(DifficultyChange {
                    from: Difficulty::clamped(from),
                    to: Difficulty::clamped(to),
                    accuracy: accuracy.unwrap_or(0.0),
                    reason: row.get("reason")?,
                    timestamp: row.get("timestamp")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(DifficultyProfile { key: key.clone(), current, history }))
    }
}

impl PerformanceStore for SqliteStore {
    fn append_response(&self, response: &NewResponse<'_>) -> StorageResult<i64> {
        insert_response(&*self.conn()?, response)
    }

    fn get_recent_responses(&self, key: &StudyKey, limit: usize) -> StorageResult<Vec<PerformanceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT is_correct, response_time_seconds, difficulty_level, timestamp, topic FROM responses
             WHERE student_id = ?1 AND level = ?2 AND subject = ?3
             ORDER BY response_id DESC
             LIMIT ?4",
        )?;
        let mut records = stmt
            .query_map(
                params![key.student_id, key.level, key.subject, limit as i64],
                |row| {
                    let difficulty: i64 = row.get("difficulty_level")?;
                    Ok(PerformanceRecord {
                        is_correct: row.get("is_correct")?,
                        response_time_seconds: row.get("response_time_seconds")?,
                        difficulty_used: Difficulty::clamped(difficulty),
                        timestamp: row.get("timestamp")?,
                        topic: row.get("topic")?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    fn get_difficulty(&self, key: &StudyKey) -> StorageResult<Option<Difficulty>> {
        let level: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT current_difficulty FROM difficulty_profile
                 WHERE student_id = ?1 AND level = ?2 AND subject = ?3",
                params![key.student_id, key.level, key.subject],
                |row| row.get(0),
            )
            .optional()?;
        Ok(level.map(Difficulty::clamped))
    }

    fn set_difficulty(
        &self,
        key: &StudyKey,
        new_level: Difficulty,
        accuracy: Option<f64>,
        reason: &str,
    ) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let previous: Option<i64> = tx
            .query_row(
                "SELECT current_difficulty FROM difficulty_profile
                 WHERE student_id = ?1 AND level = ?2 AND subject = ?3",
                params![key.student_id, key.level, key.subject],
                |row| row.get(0),
            )
            .optional()?;
        let now = Utc::now();
        tx.execute(
            "INSERT INTO difficulty_profile (student_id, level, subject, current_difficulty, recent_accuracy, adjustment_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (student_id, level, subject) DO UPDATE SET
                current_difficulty = excluded.current_difficulty,
                recent_accuracy = excluded.recent_accuracy,
                adjustment_timestamp = excluded.adjustment_timestamp",
            params![key.student_id, key.level, key.subject, i64::from(new_level), accuracy, now],
        )?;
        tx.execute(
            "INSERT INTO difficulty_history
                (student_id, level, subject, from_difficulty, to_difficulty, accuracy, reason, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key.student_id,
                key.level,
                key.subject,
                previous.unwrap_or_else(|| i64::from(new_level)),
                i64::from(new_level),
                accuracy,
                reason,
                now,
            ],
        )?;
        tx.commit()?;
        info!(target: "difficulty", %key, level = new_level.value(), %reason, "Difficulty stored");
        Ok(())
    }
}

fn insert_response(conn: &Connection, response: &NewResponse<'_>) -> StorageResult<i64> {
    let r = response.record;
    conn.execute(
        "INSERT INTO responses
            (session_id, student_id, level, subject, topic, question_id, question_text, expected_answer,
             student_answer, is_correct, difficulty_level, response_time_seconds, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            response.session_id,
            response.key.student_id,
            response.key.level,
            response.key.subject,
            r.topic,
            response.question_id,
            response.question_text,
            response.expected_answer,
            response.student_answer,
            r.is_correct,
            i64::from(r.difficulty_used),
            r.response_time_seconds,
            r.timestamp,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn upsert_progress(conn: &Connection, key: &StudyKey, theme: &str, is_correct: bool) -> StorageResult<ThemeProgress> {
    let existing: Option<(i64, i64)> = conn
        .query_row(
            "SELECT total_attempts, correct_attempts FROM progress
             WHERE student_id = ?1 AND level = ?2 AND subject = ?3 AND theme = ?4",
            params![key.student_id, key.level, key.subject, theme],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (total, correct) = tally(existing, is_correct);
    let accuracy = round2(100.0 * correct as f64 / total as f64);
    let status = MasteryStatus::from_accuracy(accuracy).as_str();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO progress
            (student_id, level, subject, theme, total_attempts, correct_attempts, accuracy_rate, last_attempted, mastery_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (student_id, level, subject, theme) DO UPDATE SET
            total_attempts = excluded.total_attempts,
            correct_attempts = excluded.correct_attempts,
            accuracy_rate = excluded.accuracy_rate,
            last_attempted = excluded.last_attempted,
            mastery_status = excluded.mastery_status",
        params![key.student_id, key.level, key.subject, theme, total, correct, accuracy, now, status],
    )?;
    Ok(ThemeProgress {
        theme: theme.to_string(),
        total_attempts: total,
        correct_attempts: correct,
        accuracy_rate: accuracy,
        last_attempted: Some(now),
        mastery_status: status.to_string(),
    })
}

fn upsert_topic_mastery(conn: &Connection, key: &StudyKey, topic: &str, is_correct: bool) -> StorageResult<TopicMastery> {
    let existing: Option<(i64, i64)> = conn
        .query_row(
            "SELECT attempts, correct_attempts FROM topic_mastery
             WHERE student_id = ?1 AND level = ?2 AND subject = ?3 AND topic = ?4",
            params![key.student_id, key.level, key.subject, topic],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (attempts, correct) = tally(existing, is_correct);
    let mastery = round2(100.0 * correct as f64 / attempts as f64);
    let status = MasteryStatus::from_accuracy(mastery).as_str();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO topic_mastery
            (student_id, level, subject, topic, mastery_percentage, attempts, correct_attempts, last_practiced, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (student_id, level, subject, topic) DO UPDATE SET
            mastery_percentage = excluded.mastery_percentage,
            attempts = excluded.attempts,
            correct_attempts = excluded.correct_attempts,
            last_practiced = excluded.last_practiced,
            status = excluded.status",
        params![key.student_id, key.level, key.subject, topic, mastery, attempts, correct, now, status],
    )?;
    Ok(TopicMastery {
        topic: topic.to_string(),
        mastery_percentage: mastery,
        attempts,
        correct_attempts: correct,
        status: status.to_string(),
        last_practiced: Some(now),
    })
}

fn tally(existing: Option<(i64, i64)>, is_correct: bool) -> (i64, i64) {
    let (total, correct) = existing.unwrap_or((0, 0));
    (total + 1, correct + i64::from(is_correct))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.get("session_id")?,
        student_id: row.get("student_id")?,
        level: row.get("level")?,
        subject: row.get("subject")?,
        theme: row.get("theme")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        duration_seconds: row.get("duration_seconds")?,
    })
}

fn mastery_from_row(row: &Row<'_>) -> rusqlite::Result<TopicMastery> {
    Ok(TopicMastery {
        topic: row.get("topic")?,
        mastery_percentage: row.get("mastery_percentage")?,
        attempts: row.get("attempts")?,
        correct_attempts: row.get("correct_attempts")?,
        status: row.get("status")?,
        last_practiced: row.get("last_practiced")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SqliteStore, StudyKey) {
        let store = SqliteStore::in_memory().expect("in-memory store");
        let id = store.add_student("Amina", "p2").expect("add student");
        (store, StudyKey::new(id, "P2", "mathematics"))
    }

    fn record(is_correct: bool) -> PerformanceRecord {
        PerformanceRecord::observe(is_correct, 4.0, 2).unwrap().with_topic("addition")
    }

    #[test]
    fn student_round_trip() {
        let (store, key) = setup();
        let s = store.get_student(key.student_id).unwrap().expect("student exists");
        assert_eq!(s.name, "Amina");
        assert_eq!(s.grade, "P2");
        assert!(s.last_active.is_none());

        store.update_last_active(key.student_id).unwrap();
        assert!(store.get_student(key.student_id).unwrap().unwrap().last_active.is_some());
        assert!(matches!(store.update_last_active(999), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn recent_responses_are_oldest_first_and_limited() {
        let (store, key) = setup();
        for ok in [false, true, true, false] {
            let r = record(ok);
            store
                .append_response(&NewResponse {
                    key: &key,
                    session_id: None,
                    question_id: "q",
                    question_text: "2 + 2?",
                    expected_answer: "4",
                    student_answer: "4",
                    record: &r,
                })
                .unwrap();
        }
        let recent = store.get_recent_responses(&key, 3).unwrap();
        let outcomes: Vec<bool> = recent.iter().map(|r| r.is_correct).collect();
        assert_eq!(outcomes, vec![true, true, false]);
        assert_eq!(recent[0].topic.as_deref(), Some("addition"));

        let other = StudyKey::new(key.student_id, "P2", "english");
        assert!(store.get_recent_responses(&other, 10).unwrap().is_empty());
    }

    #[test]
    fn difficulty_is_last_write_wins_with_history() {
        let (store, key) = setup();
        assert_eq!(store.get_difficulty(&key).unwrap(), None);
        assert!(store.get_difficulty_profile(&key).unwrap().is_none());

        store.set_difficulty(&key, Difficulty::new(3).unwrap(), Some(0.9), "raise").unwrap();
        store.set_difficulty(&key, Difficulty::new(2).unwrap(), Some(0.4), "lower").unwrap();

        assert_eq!(store.get_difficulty(&key).unwrap(), Some(Difficulty::MEDIUM));
        let profile = store.get_difficulty_profile(&key).unwrap().unwrap();
        assert_eq!(profile.history.len(), 2);
        assert_eq!(profile.history[1].from.value(), 3);
        assert_eq!(profile.history[1].to.value(), 2);
        assert_eq!(profile.history[1].reason, "lower");
    }

    #[test]
    fn record_answer_writes_all_rows_or_none() {
        let (store, key) = setup();
        let r = record(true);
        let response = NewResponse {
            key: &key,
            session_id: None,
            question_id: "q1",
            question_text: "3 + 4?",
            expected_answer: "7",
            student_answer: "7",
            record: &r,
        };
        let stored = store.record_answer(&response, "Addition").unwrap();
        assert_eq!(stored.theme_progress.total_attempts, 1);
        assert_eq!(stored.topic_mastery.topic, "addition");
        assert_eq!(store.get_recent_responses(&key, 10).unwrap().len(), 1);

        store.execute_batch("DROP TABLE topic_mastery;").unwrap();
        assert!(store.record_answer(&response, "Addition").is_err());
        assert_eq!(store.get_recent_responses(&key, 10).unwrap().len(), 1);
        assert_eq!(store.get_progress(&key).unwrap()[0].total_attempts, 1);
    }

    #[test]
    fn progress_accumulates_per_theme() {
        let (store, key) = setup();
        store.update_progress(&key, "Numbers", true).unwrap();
        store.update_progress(&key, "Numbers", false).unwrap();
        let p = store.update_progress(&key, "Numbers", true).unwrap();
        assert_eq!(p.total_attempts, 3);
        assert_eq!(p.correct_attempts, 2);
        assert_eq!(p.accuracy_rate, 66.67);

        let rows = store.get_progress(&key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mastery_status, "developing");
        assert_eq!(store.studied_keys(key.student_id).unwrap(), vec![key.clone()]);
    }

    #[test]
    fn weak_topics_sorted_ascending_under_threshold() {
        let (store, key) = setup();
        for _ in 0..4 {
            store.update_topic_mastery(&key, "fractions", false).unwrap();
        }
        store.update_topic_mastery(&key, "shapes", true).unwrap();
        store.update_topic_mastery(&key, "money", true).unwrap();
        store.update_topic_mastery(&key, "money", false).unwrap();

        let weak = store.get_weak_topics(&key, 70.0).unwrap();
        let names: Vec<&str> = weak.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, vec!["fractions", "money"]);

        let all = store.get_topic_mastery(&key).unwrap();
        assert_eq!(all[0].topic, "shapes");
    }

    #[test]
    fn ending_a_session_records_duration() {
        let (store, key) = setup();
        let id = store.create_session(&key, "Numbers").unwrap();
        let ended = store.end_session(id).unwrap();
        assert!(ended.end_time.is_some());
        assert!(ended.duration_seconds.unwrap() >= 0);
        assert!(matches!(store.end_session(404), Err(StorageError::NotFound(_))));
    }
}
