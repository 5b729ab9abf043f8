//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Students and reporting
        .route("/api/v1/students", post(http::http_create_student))
        .route("/api/v1/students/:id", get(http::http_get_student))
        .route("/api/v1/students/:id/dashboard", get(http::http_get_dashboard))
        .route("/api/v1/students/:id/report", get(http::http_get_report))
        .route("/api/v1/students/:id/analysis", get(http::http_get_analysis))
        // Sessions
        .route("/api/v1/sessions", post(http::http_start_session))
        .route("/api/v1/sessions/:id", get(http::http_get_session))
        .route("/api/v1/sessions/:id/question", get(http::http_get_question))
        .route("/api/v1/sessions/:id/hint", get(http::http_get_hint))
        .route("/api/v1/sessions/:id/answer", post(http::http_post_answer))
        .route("/api/v1/sessions/:id/end", post(http::http_end_session))
        // Curriculum + free questions
        .route("/api/v1/curriculum/:level", get(http::http_get_curriculum))
        .route("/api/v1/curriculum/:level/:subject", get(http::http_get_boundaries))
        .route("/api/v1/ask", post(http::http_post_ask))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
