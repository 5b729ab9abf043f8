//! HTTP endpoint handlers. These are thin wrappers that forward to state and core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument};

use crate::analytics::{Dashboard, ProgressAnalytics, ReportFormat, SubjectAnalysis};
use crate::curriculum::{Boundaries, LevelSummary};
use crate::domain::Student;
use crate::error::{TutorError, TutorResult};
use crate::protocol::*;
use crate::session::{AnswerOutcome, SessionProgress, SessionSummary};
use crate::state::AppState;

impl IntoResponse for TutorError {
  fn into_response(self) -> Response {
    let status = match &self {
      TutorError::InvalidObservation(_) | TutorError::InvalidCurriculum(_) | TutorError::NoPendingQuestion => {
        StatusCode::BAD_REQUEST
      }
      TutorError::NotFound(_) => StatusCode::NOT_FOUND,
      TutorError::Generation(_) => StatusCode::SERVICE_UNAVAILABLE,
      TutorError::Storage(_) | TutorError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
      error!(target: "toto_backend", %status, error = %self, "Request failed");
    }
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, llm_enabled: state.llm.is_some() })
}

#[instrument(level = "info", skip(state, body), fields(grade = %body.grade))]
pub async fn http_create_student(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NewStudentIn>,
) -> TutorResult<(StatusCode, Json<StudentCreatedOut>)> {
  let student_id = state.store.add_student(body.name.trim(), &body.grade)?;
  info!(target: "toto_backend", student_id, "HTTP student created");
  Ok((StatusCode::CREATED, Json(StudentCreatedOut { student_id })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_student(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> TutorResult<Json<Student>> {
  let student = state.store.get_student(id)?.ok_or_else(|| TutorError::NotFound(format!("student {}", id)))?;
  Ok(Json(student))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_dashboard(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> TutorResult<Json<Dashboard>> {
  Ok(Json(ProgressAnalytics::new(&state.store, &state.curriculum).dashboard(id)?))
}

/// Parent report as JSON, or the plain-text export when `format=text`.
#[instrument(level = "info", skip(state, q), fields(format = ?q.format))]
pub async fn http_get_report(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
  Query(q): Query<ReportQuery>,
) -> TutorResult<Response> {
  let analytics = ProgressAnalytics::new(&state.store, &state.curriculum);
  match q.format {
    ReportFormat::Json => Ok(Json(analytics.parent_report(id)?).into_response()),
    ReportFormat::Text => {
      let text = analytics.export(id, ReportFormat::Text)?;
      Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
    }
  }
}

#[instrument(level = "info", skip(state, q), fields(level = %q.level, subject = %q.subject))]
pub async fn http_get_analysis(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
  Query(q): Query<AnalysisQuery>,
) -> TutorResult<Json<SubjectAnalysis>> {
  let analysis = ProgressAnalytics::new(&state.store, &state.curriculum).subject_analysis(id, &q.level, &q.subject)?;
  Ok(Json(analysis))
}

#[instrument(level = "info", skip(state, body), fields(student_id = body.student_id, level = %body.level, subject = %body.subject, theme = %body.theme))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartSessionIn>,
) -> TutorResult<(StatusCode, Json<SessionProgress>)> {
  let progress = state.start_session(body.student_id, &body.level, &body.subject, &body.theme).await?;
  info!(target: "session", session_id = progress.session_id, difficulty = progress.current_difficulty.value(), "HTTP session started");
  Ok((StatusCode::CREATED, Json(progress)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> TutorResult<Json<SessionProgress>> {
  Ok(Json(state.session_progress(id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> TutorResult<Json<QuestionOut>> {
  let q = state.next_question(id).await?;
  info!(target: "session", session_id = id, question_id = %q.question_id, difficulty = q.difficulty.value(), "HTTP question served");
  Ok(Json(q))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_hint(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> TutorResult<Json<HintOut>> {
  let text = state.hint(id).await?;
  Ok(Json(HintOut { text }))
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.answer.len()))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
  Json(body): Json<AnswerIn>,
) -> TutorResult<Json<AnswerOutcome>> {
  let outcome = state.submit_answer(id, &body).await?;
  info!(target: "session", session_id = id, correct = outcome.is_correct, difficulty = outcome.difficulty_after.value(), "HTTP answer evaluated");
  Ok(Json(outcome))
}

#[instrument(level = "info", skip(state))]
pub async fn http_end_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> TutorResult<Json<SessionSummary>> {
  Ok(Json(state.end_session(id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_curriculum(
  State(state): State<Arc<AppState>>,
  Path(level): Path<String>,
) -> TutorResult<Json<LevelSummary>> {
  state
    .curriculum
    .summary(&level)
    .map(Json)
    .ok_or_else(|| TutorError::NotFound(format!("curriculum level {}", level)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_boundaries(
  State(state): State<Arc<AppState>>,
  Path((level, subject)): Path<(String, String)>,
) -> TutorResult<Json<Boundaries>> {
  state
    .curriculum
    .boundaries(&level, &subject)
    .map(Json)
    .ok_or_else(|| TutorError::NotFound(format!("curriculum {} {}", level, subject)))
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len()))]
pub async fn http_post_ask(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AskIn>,
) -> impl IntoResponse {
  let text = state.ask(&body.text).await;
  Json(AskOut { text })
}
