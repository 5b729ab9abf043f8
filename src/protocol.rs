//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::analytics::ReportFormat;
use crate::domain::{Difficulty, Question, QuestionKind};

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub llm_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewStudentIn {
    pub name: String,
    pub grade: String,
}

#[derive(Serialize)]
pub struct StudentCreatedOut {
    pub student_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionIn {
    pub student_id: i64,
    pub level: String,
    pub subject: String,
    pub theme: String,
}

/// A question as shown to the child. The expected answer stays server-side.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub session_id: i64,
    pub question_id: String,
    pub text: String,
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub difficulty_name: &'static str,
    pub topic: String,
    pub has_hint: bool,
}

/// Convert an internal `Question` to the public DTO.
pub fn to_out(session_id: i64, q: &Question) -> QuestionOut {
    QuestionOut {
        session_id,
        question_id: q.id.clone(),
        text: q.text.clone(),
        kind: q.kind,
        difficulty: q.difficulty,
        difficulty_name: q.difficulty.name(),
        topic: q.topic.clone(),
        has_hint: !q.hint.trim().is_empty(),
    }
}

#[derive(Serialize)]
pub struct HintOut {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    pub answer: String,
    /// Client-measured seconds; the server-side timer is used when absent.
    #[serde(default)]
    pub response_time_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisQuery {
    pub level: String,
    pub subject: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Deserialize)]
pub struct AskIn {
    pub text: String,
}
#[derive(Serialize)]
pub struct AskOut {
    pub text: String,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
