//! Application state: store, curriculum, prompts, optional LLM client and live sessions.
//!
//! This module owns:
//!   - the SQLite store and the loaded curriculum
//!   - the prompts and adaptor tuning (from TOML or defaults)
//!   - optional question/evaluator client
//!   - the table of open sessions and the per-key locks that serialize answer handling
//!     (held weakly, so a key's entry lives only while some answer holds or awaits it)
//!
//! Question generation has no local fallback: without a working model the caller gets an error.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::adaptor::AdaptorConfig;
use crate::config::{load_tutor_config_from_env, Prompts, Settings, TutorConfig};
use crate::curriculum::Curriculum;
use crate::domain::{Generation, StudyKey};
use crate::error::{TutorError, TutorResult};
use crate::llm::{EvaluationRequest, LlmClient};
use crate::protocol::{to_out, AnswerIn, QuestionOut};
use crate::session::{AnswerOutcome, LearningSession, SessionProgress, SessionSummary};
use crate::store::{StorageError, SqliteStore};

pub type SharedSession = Arc<Mutex<LearningSession>>;

pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub curriculum: Arc<Curriculum>,
    pub llm: Option<LlmClient>,
    pub prompts: Prompts,
    pub adaptor_config: AdaptorConfig,
    sessions: RwLock<HashMap<i64, SharedSession>>,
    key_locks: Mutex<HashMap<StudyKey, Weak<Mutex<()>>>>,
}

impl AppState {
    /// Build state from env: load config, open the database, load the curriculum, init the LLM client.
    #[instrument(level = "info", skip_all)]
    pub fn new(settings: &Settings) -> Result<Self, StorageError> {
        let config = load_tutor_config_from_env().unwrap_or_default();
        let store = SqliteStore::open(&settings.database_path)?;
        let curriculum = Curriculum::load(&settings.curriculum_dir);

        let llm = LlmClient::from_env();
        if let Some(c) = &llm {
            info!(target: "toto_backend", base_url = %c.base_url, question_model = %c.question_model, evaluator_model = %c.evaluator_model, "LLM enabled.");
        } else {
            warn!(target: "toto_backend", "LLM disabled. Question generation will fail.");
        }

        Ok(Self::from_parts(store, curriculum, llm, config))
    }

    pub fn from_parts(store: SqliteStore, curriculum: Curriculum, llm: Option<LlmClient>, config: TutorConfig) -> Self {
        Self {
            store: Arc::new(store),
            curriculum: Arc::new(curriculum),
            llm,
            prompts: config.prompts,
            adaptor_config: config.adaptor,
            sessions: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn start_session(
        &self,
        student_id: i64,
        level: &str,
        subject: &str,
        theme: &str,
    ) -> TutorResult<SessionProgress> {
        let session = LearningSession::start(
            &self.store,
            &self.curriculum,
            &self.adaptor_config,
            student_id,
            level,
            subject,
            theme,
        )?;
        let progress = session.progress();
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::new(Mutex::new(session)));
        Ok(progress)
    }

    /// Live session by id.
    pub async fn session(&self, session_id: i64) -> TutorResult<SharedSession> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| TutorError::NotFound(format!("active session {}", session_id)))
    }

    pub async fn session_progress(&self, session_id: i64) -> TutorResult<SessionProgress> {
        let session = self.session(session_id).await?;
        let guard = session.lock().await;
        Ok(guard.progress())
    }

    /// Generate a question at the session's current level and make it pending.
    #[instrument(level = "info", skip(self), fields(%session_id))]
    pub async fn next_question(&self, session_id: i64) -> TutorResult<QuestionOut> {
        let session = self.session(session_id).await?;
        let mut guard = session.lock().await;
        let Some(llm) = &self.llm else {
            error!(target: "session", %session_id, "No question service configured");
            return Err(TutorError::Generation("question service is not configured".into()));
        };

        let key = guard.key().clone();
        let competences = self.curriculum.theme_competences(&key.level, &key.subject, guard.theme());
        let request = guard.question_request(&competences);
        let question = match llm.generate_question(&self.prompts, &request).await {
            Generation::Generated(q) => q,
            Generation::Failed(reason) => return Err(TutorError::Generation(reason)),
        };

        let check = self.curriculum.validate_content(&key.level, &key.subject, &question.text);
        for w in &check.warnings {
            warn!(target: "session", %session_id, question_id = %question.id, warning = %w, "Generated question flagged");
        }

        let out = to_out(session_id, &question);
        guard.present(question);
        Ok(out)
    }

    pub async fn hint(&self, session_id: i64) -> TutorResult<String> {
        let session = self.session(session_id).await?;
        let guard = session.lock().await;
        guard.hint()
    }

    /// Evaluate and record an answer. Everything from reading the stored level to writing the
    /// new one runs under the key's lock.
    #[instrument(level = "info", skip(self, body), fields(%session_id, answer_len = body.answer.len()))]
    pub async fn submit_answer(&self, session_id: i64, body: &AnswerIn) -> TutorResult<AnswerOutcome> {
        let session = self.session(session_id).await?;
        let mut guard = session.lock().await;
        let question = guard.pending_question().cloned().ok_or(TutorError::NoPendingQuestion)?;

        let verdict = match &self.llm {
            Some(llm) => {
                let key = guard.key();
                let req = EvaluationRequest {
                    level: &key.level,
                    subject: &key.subject,
                    theme: guard.theme(),
                    question: &question.text,
                    expected: &question.expected_answer,
                    answer: &body.answer,
                };
                match llm.evaluate_answer(&self.prompts, &req).await {
                    Ok(v) => Some(v),
                    Err(e) => {
                        error!(target: "session", %session_id, error = %e, "Answer evaluation failed; using local check.");
                        None
                    }
                }
            }
            None => None,
        };

        let lock = self.key_lock(guard.key()).await;
        let _held = lock.lock().await;
        guard.refresh(&self.store)?;
        match body.response_time_seconds {
            Some(t) => guard.submit_answer_timed(&self.store, &body.answer, verdict, t),
            None => guard.submit_answer(&self.store, &body.answer, verdict),
        }
    }

    /// Close the session and drop it from the live table.
    #[instrument(level = "info", skip(self), fields(%session_id))]
    pub async fn end_session(&self, session_id: i64) -> TutorResult<SessionSummary> {
        let session = self.session(session_id).await?;
        let summary = {
            let mut guard = session.lock().await;
            guard.end(&self.store, &self.curriculum)?
        };
        self.sessions.write().await.remove(&session_id);
        self.key_locks.lock().await.retain(|_, lock| lock.strong_count() > 0);
        Ok(summary)
    }

    /// Free question from the child. Falls back to a canned reply when the model is unavailable.
    #[instrument(level = "info", skip(self, text), fields(text_len = text.len()))]
    pub async fn ask(&self, text: &str) -> String {
        if let Some(llm) = &self.llm {
            match llm.tutor_reply(&self.prompts, text).await {
                Ok(t) if !t.is_empty() => return t,
                Ok(_) => warn!(target: "toto_backend", "Tutor reply was empty; using stub."),
                Err(e) => error!(target: "toto_backend", error = %e, "Tutor reply failed; using stub."),
            }
        }
        ask_stub(text)
    }

    async fn key_lock(&self, key: &StudyKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }
}

fn ask_stub(text: &str) -> String {
    if text.trim().is_empty() {
        "Ask me anything about your lessons and we will find the answer together!".into()
    } else {
        "That's a good question! Let's think about it together with your teacher, and keep practising.".into()
    }
}
