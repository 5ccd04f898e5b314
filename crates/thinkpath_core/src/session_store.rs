//! crates/thinkpath_core/src/session_store.rs
//!
//! Owns the saved reasoning sessions: creation from a model decomposition,
//! forward-only progress updates, per-user listing for history, and persistence
//! of the whole list to key-value storage after every mutation.
//!
//! Every session belongs to the user who created it. Reads take the caller's id
//! and treat another user's session exactly like a missing one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Decomposition, Field, Session};
use crate::error::{TutorError, TutorResult};
use crate::ports::{KeyValueStore, TutorModelService};
use crate::storage::{load_json, save_json};

pub const DEFAULT_SESSIONS_KEY: &str = "thinkpath_saved_sessions_v1";

/// Upper bound on the number of steps accepted from a decomposition.
pub const MAX_STEPS: usize = 8;

/// Settings threaded into the store at construction.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    pub storage_key: String,
    pub model_timeout: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_SESSIONS_KEY.to_string(),
            model_timeout: Duration::from_secs(60),
        }
    }
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    model: Arc<dyn TutorModelService>,
    config: SessionStoreConfig,
    /// Most-recently-created first.
    sessions: RwLock<Vec<Session>>,
}

impl SessionStore {
    /// Creates the store and loads any previously saved sessions.
    pub async fn init(
        storage: Arc<dyn KeyValueStore>,
        model: Arc<dyn TutorModelService>,
        config: SessionStoreConfig,
    ) -> Self {
        let store = Self {
            storage,
            model,
            config,
            sessions: RwLock::new(Vec::new()),
        };
        store.load_from_storage().await;
        store
    }

    /// Upper bound applied to every model call made on behalf of a session.
    pub fn model_timeout(&self) -> Duration {
        self.config.model_timeout
    }

    /// Asks the model to decompose `problem` and saves the resulting session.
    ///
    /// Nothing is stored unless the decomposition succeeds and validates.
    pub async fn create_session(
        &self,
        owner: Uuid,
        field: Field,
        problem: &str,
        image_data: Option<String>,
        enhanced_thinking: bool,
    ) -> TutorResult<Session> {
        let problem = problem.trim();
        if problem.is_empty() {
            return Err(TutorError::AnalysisFailure);
        }

        let call = self
            .model
            .decompose(field, problem, image_data.as_deref(), enhanced_thinking);
        let decomposition = match tokio::time::timeout(self.config.model_timeout, call).await {
            Ok(Ok(decomposition)) => decomposition,
            Ok(Err(e)) => {
                error!("Problem analysis failed: {}", e);
                return Err(TutorError::AnalysisFailure);
            }
            Err(_) => {
                error!("Problem analysis timed out after {:?}", self.config.model_timeout);
                return Err(TutorError::AnalysisFailure);
            }
        };
        let decomposition = validate_decomposition(decomposition)?;

        let session = Session::new(
            owner,
            field,
            problem.to_string(),
            image_data,
            decomposition,
            enhanced_thinking,
        );
        info!(
            session_id = %session.id(),
            owner = %owner,
            field = %field,
            steps = session.steps().len(),
            "Created reasoning session"
        );

        let mut sessions = self.sessions.write().await;
        sessions.insert(0, session.clone());
        self.persist(&sessions).await;
        Ok(session)
    }

    /// Moves the session's progress marker forward to `new_index`.
    ///
    /// Unknown ids and non-advancing indices are no-ops. The index is clamped to
    /// the number of steps. Returns the session as it stands afterwards.
    pub async fn update_progress(&self, session_id: Uuid, new_index: usize) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.iter_mut().find(|s| s.id() == session_id)?;

        let previous = session.current_step_index();
        if !session.advance_to(new_index) {
            if new_index < previous {
                warn!(
                    session_id = %session_id,
                    previous,
                    requested = new_index,
                    "Ignoring attempt to move progress backwards"
                );
            }
            return Some(session.clone());
        }

        let updated = session.clone();
        info!(
            session_id = %session_id,
            step = updated.current_step_index(),
            complete = updated.is_complete(),
            "Session progress updated"
        );
        self.persist(&sessions).await;
        Some(updated)
    }

    /// The owner's sessions, most recently created first.
    pub async fn list_sessions(&self, owner: Uuid) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|s| s.owner() == owner)
            .cloned()
            .collect()
    }

    /// One of the owner's sessions; `None` if it does not exist or is someone else's.
    pub async fn get_session(&self, owner: Uuid, session_id: Uuid) -> Option<Session> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.id() == session_id && s.owner() == owner)
            .cloned()
    }

    /// Replaces the in-memory list with what is in storage.
    ///
    /// Missing, unreadable or corrupt data all result in an empty history.
    pub async fn load_from_storage(&self) {
        let mut loaded = match load_json::<Vec<Session>>(self.storage.as_ref(), &self.config.storage_key).await {
            Ok(Some(sessions)) => sessions,
            Ok(None) => Vec::new(),
            Err(TutorError::StorageCorruption(key)) => {
                warn!("Failed to parse sessions stored under '{}'; starting empty", key);
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to load sessions: {}; starting empty", e);
                Vec::new()
            }
        };

        for session in loaded.iter_mut() {
            if session.clamp_progress() {
                warn!(session_id = %session.id(), "Clamped out-of-range progress on load");
            }
        }
        info!("Loaded {} saved sessions", loaded.len());
        *self.sessions.write().await = loaded;
    }

    /// Writes the current list to storage.
    pub async fn persist_to_storage(&self) -> TutorResult<()> {
        let sessions = self.sessions.read().await;
        save_json(self.storage.as_ref(), &self.config.storage_key, &*sessions).await
    }

    /// Best-effort write used after mutations; failures are logged, not returned.
    async fn persist(&self, sessions: &[Session]) {
        if let Err(e) = save_json(self.storage.as_ref(), &self.config.storage_key, sessions).await {
            error!("Failed to persist sessions: {}", e);
        }
    }
}

/// Rejects decompositions that are structurally valid JSON but unusable.
pub fn validate_decomposition(decomposition: Decomposition) -> TutorResult<Decomposition> {
    let step_count = decomposition.steps.len();
    if step_count == 0 || step_count > MAX_STEPS {
        warn!("Decomposition returned {} steps", step_count);
        return Err(TutorError::AnalysisFailure);
    }
    let has_blank_step = decomposition
        .steps
        .iter()
        .any(|s| s.explanation.trim().is_empty() || s.check_question.trim().is_empty());
    if has_blank_step || decomposition.final_solution.trim().is_empty() {
        warn!("Decomposition is missing step text or the final solution");
        return Err(TutorError::AnalysisFailure);
    }
    if !(3..=5).contains(&step_count) {
        info!("Accepting decomposition with {} steps", step_count);
    }
    Ok(decomposition)
}
