//! Toto Fryn · adaptive tutoring backend
//!
//! - Axum HTTP API under /api/v1
//! - SQLite persistence (rusqlite)
//! - Optional OpenAI-compatible model for questions and grading (Ollama works)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   DATABASE_PATH       : SQLite file (default "data/toto_learning.db")
//!   CURRICULUM_DIR      : curriculum JSON root (default "data/curriculum")
//!   LLM_BASE_URL        : enables the model client, e.g. "http://localhost:11434/v1"
//!   LLM_API_KEY         : bearer token, optional for local servers
//!   LLM_QUESTION_MODEL  : default "llama3.2:1b"
//!   LLM_EVALUATOR_MODEL : defaults to the question model
//!   TUTOR_CONFIG_PATH   : TOML with [prompts] and [adaptor] overrides
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use toto_backend::config::Settings;
use toto_backend::routes::build_router;
use toto_backend::state::AppState;
use toto_backend::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env();
  let state = Arc::new(AppState::new(&settings)?);
  let app = build_router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "toto_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "toto_backend", error = %e, "Failed to listen for shutdown signal");
  }
  info!(target: "toto_backend", "Shutting down");
}
