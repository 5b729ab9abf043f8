//! Minimal OpenAI-compatible chat client (works against Ollama's `/v1` endpoint or OpenAI).
//!
//! We only call chat.completions and request either plain text or a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//! There is no retry policy here; callers decide what a failure means.
//!
//! NOTE: We never log the API key and we keep payload previews short to avoid PII leaks.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{Difficulty, Generation, Question, QuestionKind, Verdict};
use crate::util::{extract_json_object, fill_template, trunc_for_log};

/// What the question writer needs to know.
#[derive(Clone, Debug)]
pub struct QuestionRequest<'a> {
  pub level: &'a str,
  pub subject: &'a str,
  pub theme: &'a str,
  pub competences: &'a [String],
  pub difficulty: Difficulty,
}

/// Answer-evaluation context.
#[derive(Clone, Debug)]
pub struct EvaluationRequest<'a> {
  pub level: &'a str,
  pub subject: &'a str,
  pub theme: &'a str,
  pub question: &'a str,
  pub expected: &'a str,
  pub answer: &'a str,
}

#[derive(Clone)]
pub struct LlmClient {
  pub client: reqwest::Client,
  pub api_key: Option<String>,
  pub base_url: String,
  pub question_model: String,
  pub evaluator_model: String,
}

#[derive(Deserialize)]
struct GeneratedQuestion {
  question_text: String,
  expected_answer: String,
  #[serde(default)] hint: String,
  #[serde(default)] question_type: QuestionKind,
  #[serde(default)] topic: Option<String>,
}

impl LlmClient {
  /// Construct the client if LLM_BASE_URL or LLM_API_KEY is set; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    let base_url = std::env::var("LLM_BASE_URL").ok();
    if api_key.is_none() && base_url.is_none() {
      return None;
    }
    let base_url = base_url.unwrap_or_else(|| "http://localhost:11434/v1".into());
    let question_model =
      std::env::var("LLM_QUESTION_MODEL").unwrap_or_else(|_| "llama3.2:1b".into());
    let evaluator_model =
      std::env::var("LLM_EVALUATOR_MODEL").unwrap_or_else(|_| question_model.clone());
    Self::new(base_url, api_key, question_model, evaluator_model)
  }

  pub fn new(base_url: String, api_key: Option<String>, question_model: String, evaluator_model: String) -> Option<Self> {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(60)).build() {
      Ok(c) => c,
      Err(e) => {
        error!(target: "toto_backend", %base_url, error = %e, "HTTP client could not be built; LLM disabled.");
        return None;
      }
    };
    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), question_model, evaluator_model })
  }

  async fn chat(&self, req: &ChatCompletionRequest) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let mut builder = self.client.post(&url)
      .header(USER_AGENT, "toto-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    if let Some(key) = &self.api_key {
      builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
    }
    let res = builder.json(req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(format!("LLM HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "LLM usage");
    }
    Ok(body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string())
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_plain(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String, String> {
    let req = ChatCompletionRequest::new(model, system, user, temperature, None);
    self.chat(&req).await
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let req = ChatCompletionRequest::new(
      model, system, user, temperature,
      Some(ResponseFormat { r#type: "json_object".into() }),
    );
    let text = self.chat(&req).await?;
    let json = extract_json_object(&text).unwrap_or(&text);
    serde_json::from_str::<T>(json)
      .map_err(|e| format!("JSON parse error: {} (reply: {})", e, trunc_for_log(&text, 80)))
  }

  // --- High-level helpers (domain-specialized) ---

  /// Ask the question model for one item. Never falls back to local content.
  #[instrument(
    level = "info",
    skip(self, prompts, req),
    fields(level = %req.level, subject = %req.subject, theme = %req.theme, difficulty = req.difficulty.value(), model = %self.question_model)
  )]
  pub async fn generate_question(&self, prompts: &Prompts, req: &QuestionRequest<'_>) -> Generation {
    let user = question_prompt(prompts, req);
    let start = std::time::Instant::now();
    let result = self.chat_json::<GeneratedQuestion>(&self.question_model, &prompts.question_system, &user, 0.8).await;
    let elapsed = start.elapsed();

    let gen = match result {
      Ok(g) => g,
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during question generation");
        return Generation::Failed(e);
      }
    };
    if gen.question_text.trim().is_empty() || gen.expected_answer.trim().is_empty() {
      error!(?elapsed, "Model returned a question without text or expected answer");
      return Generation::Failed("model returned an incomplete question".into());
    }

    let q = Question {
      id: Uuid::new_v4().to_string(),
      text: gen.question_text.trim().to_string(),
      expected_answer: gen.expected_answer.trim().to_string(),
      hint: gen.hint,
      kind: gen.question_type,
      difficulty: req.difficulty,
      topic: gen.topic.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| req.theme.to_string()),
    };
    info!(
      ?elapsed,
      question_id = %q.id,
      preview = %q.text.chars().take(40).collect::<String>(),
      "Question generated"
    );
    Generation::Generated(q)
  }

  #[instrument(level = "info", skip(self, prompts, req), fields(answer_len = req.answer.len(), model = %self.evaluator_model))]
  pub async fn evaluate_answer(&self, prompts: &Prompts, req: &EvaluationRequest<'_>) -> Result<Verdict, String> {
    let user = fill_template(
      &prompts.evaluation_user_template,
      &[
        ("level", req.level),
        ("subject", req.subject),
        ("theme", req.theme),
        ("question", req.question),
        ("expected", req.expected),
        ("answer", req.answer),
      ],
    );
    self.chat_json::<Verdict>(&self.evaluator_model, &prompts.evaluation_system, &user, 0.1).await
  }

  #[instrument(level = "info", skip(self, prompts, question), fields(question_len = question.len()))]
  pub async fn tutor_reply(&self, prompts: &Prompts, question: &str) -> Result<String, String> {
    self.chat_plain(&self.question_model, &prompts.tutor_system, question, 0.4).await
  }
}

/// Fill the question template for a request.
pub fn question_prompt(prompts: &Prompts, req: &QuestionRequest<'_>) -> String {
  let competences = if req.competences.is_empty() {
    "(none listed)".to_string()
  } else {
    req.competences.join("; ")
  };
  let difficulty = req.difficulty.value().to_string();
  fill_template(
    &prompts.question_user_template,
    &[
      ("level", req.level),
      ("subject", req.subject),
      ("theme", req.theme),
      ("competences", &competences),
      ("difficulty", &difficulty),
      ("difficulty_name", req.difficulty.name()),
      ("difficulty_description", req.difficulty.description()),
    ],
  )
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
  fn new(model: &str, system: &str, user: &str, temperature: f32, response_format: Option<ResponseFormat>) -> Self {
    Self {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format,
    }
  }
}

#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn question_prompt_fills_every_placeholder() {
    let competences = vec!["Adds numbers up to 10".to_string()];
    let req = QuestionRequest {
      level: "P1",
      subject: "mathematics",
      theme: "Addition",
      competences: &competences,
      difficulty: Difficulty::MEDIUM,
    };
    let prompt = question_prompt(&Prompts::default(), &req);
    assert!(prompt.contains("P1"));
    assert!(prompt.contains("'Addition'"));
    assert!(prompt.contains("Adds numbers up to 10"));
    assert!(prompt.contains("2/5 (Medium"));
    assert!(!prompt.contains("{theme}"));
  }

  #[test]
  fn new_builds_client_and_trims_base_url() {
    let c = LlmClient::new("http://localhost:11434/v1/".into(), None, "m".into(), "e".into()).expect("client");
    assert_eq!(c.base_url, "http://localhost:11434/v1");
    assert_eq!(c.evaluator_model, "e");
  }

  #[test]
  fn api_error_message_is_extracted() {
    let body = r#"{"error":{"message":"model not found","type":"invalid_request_error"}}"#;
    assert_eq!(extract_api_error(body).as_deref(), Some("model not found"));
    assert_eq!(extract_api_error("plain failure"), None);
  }

  #[test]
  fn generated_question_tolerates_missing_optional_fields() {
    let g: GeneratedQuestion = serde_json::from_str(r#"{"question_text":"2 + 3 = ?","expected_answer":"5"}"#).unwrap();
    assert_eq!(g.question_type, QuestionKind::ShortAnswer);
    assert!(g.hint.is_empty());
    assert!(g.topic.is_none());
  }

  #[tokio::test]
  async fn unreachable_endpoint_yields_failed_generation() {
    let client = LlmClient::new("http://127.0.0.1:9".into(), None, "m".into(), "m".into()).unwrap();
    let req = QuestionRequest {
      level: "P1",
      subject: "english",
      theme: "Our School",
      competences: &[],
      difficulty: Difficulty::EASY,
    };
    assert!(matches!(client.generate_question(&Prompts::default(), &req).await, Generation::Failed(_)));
  }
}
