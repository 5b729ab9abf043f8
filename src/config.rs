//! Configuration: environment settings plus an optional TOML file (prompts + adaptor tuning).
//!
//! See `TutorConfig` and `Prompts` for the expected TOML schema:
//!
//! ```toml
//! [adaptor]
//! raise_threshold = 0.85
//! lower_threshold = 0.60
//! window_size = 10
//! min_observations = 3
//!
//! [prompts]
//! question_system = "..."
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::adaptor::AdaptorConfig;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub adaptor: AdaptorConfig,
}

/// Prompts used by the question/evaluation client. Placeholders are `{name}` tokens.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Question generation
  pub question_system: String,
  pub question_user_template: String,
  // Answer evaluation
  pub evaluation_system: String,
  pub evaluation_user_template: String,
  // Free questions from the child
  pub tutor_system: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_system: "You are Toto Fryn, a question writer for primary school children in Uganda. Use simple English and Ugandan examples (Shillings, mangoes, matooke). Respond ONLY with strict JSON.".into(),
      question_user_template: "Write ONE {subject} question for a {level} learner on the theme '{theme}'.\nCompetences: {competences}\nDifficulty: {difficulty}/5 ({difficulty_name}: {difficulty_description}).\nReturn JSON with fields: question_text, expected_answer, hint, question_type (short_answer | multiple_choice | word_problem | fill_in_blank), topic.".into(),
      evaluation_system: "You are an educational assistant grading a primary school answer. Be kind and brief. Reply as compact JSON.".into(),
      evaluation_user_template: "Level: {level}\nSubject: {subject}\nTheme: {theme}\nQuestion: {question}\nExpected answer: {expected}\nStudent answer: {answer}\nReturn JSON {\"is_correct\": boolean, \"feedback\": string}. Accept equivalent wording and spelling slips; the number or idea must match.".into(),
      tutor_system: "You are Toto Fryn, an AI tutor for children in Uganda (ages 3-12). Your tone is encouraging, patient, and friendly. Use simple English, Ugandan examples, and keep answers to 1-3 sentences.".into(),
    }
  }
}

/// Process-level settings read from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub database_path: PathBuf,
  pub curriculum_dir: PathBuf,
}

impl Settings {
  pub fn from_env() -> Self {
    let port = std::env::var("PORT")
      .ok()
      .and_then(|p| p.parse::<u16>().ok())
      .unwrap_or(3000);
    let database_path = std::env::var("DATABASE_PATH")
      .map(PathBuf::from)
      .unwrap_or_else(|_| PathBuf::from("data/toto_learning.db"));
    let curriculum_dir = std::env::var("CURRICULUM_DIR")
      .map(PathBuf::from)
      .unwrap_or_else(|_| PathBuf::from("data/curriculum"));
    Self { port, database_path, curriculum_dir }
  }
}

/// Parse a TOML document into a `TutorConfig`.
pub fn parse_tutor_config(raw: &str) -> Result<TutorConfig, toml::de::Error> {
  toml::from_str::<TutorConfig>(raw)
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_tutor_config(&s) {
      Ok(cfg) => {
        info!(target: "toto_backend", %path, "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "toto_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "toto_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg = parse_tutor_config(
      r#"
        [adaptor]
        raise_threshold = 0.9
        default_difficulty = 1

        [prompts]
        tutor_system = "Be brief."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.adaptor.raise_threshold, 0.9);
    assert_eq!(cfg.adaptor.lower_threshold, 0.60);
    assert_eq!(cfg.adaptor.default_difficulty.value(), 1);
    assert_eq!(cfg.prompts.tutor_system, "Be brief.");
    assert!(cfg.prompts.question_user_template.contains("{theme}"));
  }

  #[test]
  fn out_of_range_default_difficulty_is_rejected() {
    assert!(parse_tutor_config("[adaptor]\ndefault_difficulty = 9\n").is_err());
  }

  #[test]
  fn empty_document_is_all_defaults() {
    let cfg = parse_tutor_config("").unwrap();
    assert_eq!(cfg.adaptor, AdaptorConfig::default());
  }
}
