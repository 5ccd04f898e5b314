//! crates/thinkpath_core/src/tracker.rs
//!
//! Walks a learner through one session's reasoning steps. Progress only moves
//! when the model confirms an answer, and the tracker's position is always
//! derived from the persisted `current_step_index`.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{ReasoningStep, Session, Verification};
use crate::error::{TutorError, TutorResult};
use crate::ports::TutorModelService;
use crate::session_store::SessionStore;

/// Where the learner is within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Step `i` is shown and awaiting an answer.
    Presenting(usize),
    /// An answer to step `i` is being checked by the model.
    Verifying(usize),
    Completed,
}

/// What happened to a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The answer was accepted and the next step is now presented.
    Advanced { next_index: usize, feedback: String },
    /// The answer to the last step was accepted.
    Completed { final_solution: String, feedback: String },
    /// The answer was not accepted; the same step is presented again.
    Retry { feedback: String, hint: Option<String> },
}

pub struct StepTracker {
    store: Arc<SessionStore>,
    model: Arc<dyn TutorModelService>,
    session: Session,
    state: TrackerState,
}

impl StepTracker {
    /// Loads one of `owner`'s saved sessions and positions the tracker at its
    /// persisted step. Another user's session is reported as not found.
    pub async fn resume(
        store: Arc<SessionStore>,
        model: Arc<dyn TutorModelService>,
        owner: Uuid,
        session_id: Uuid,
    ) -> TutorResult<Self> {
        let session = store
            .get_session(owner, session_id)
            .await
            .ok_or(TutorError::SessionNotFound(session_id))?;
        let state = state_for(&session);
        Ok(Self { store, model, session, state })
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The step currently shown, if the session is not finished.
    pub fn current_step(&self) -> Option<&ReasoningStep> {
        match self.state {
            TrackerState::Presenting(i) | TrackerState::Verifying(i) => self.session.step(i),
            TrackerState::Completed => None,
        }
    }

    pub fn final_solution(&self) -> Option<&str> {
        match self.state {
            TrackerState::Completed => self.session.final_solution(),
            _ => None,
        }
    }

    /// Submits the learner's answer to the presented step.
    ///
    /// On a verification failure the tracker returns to presenting the same step
    /// and nothing is persisted.
    pub async fn submit_answer(&mut self, answer: &str) -> TutorResult<StepOutcome> {
        let index = match self.state {
            TrackerState::Presenting(i) | TrackerState::Verifying(i) => i,
            TrackerState::Completed => return Err(TutorError::SessionCompleted),
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(TutorError::EmptyAnswer);
        }
        let step = self
            .session
            .step(index)
            .cloned()
            .ok_or(TutorError::SessionCompleted)?;

        self.state = TrackerState::Verifying(index);
        let verification = match self.check(&step, answer).await {
            Ok(verification) => verification,
            Err(e) => {
                self.state = TrackerState::Presenting(index);
                return Err(e);
            }
        };

        if !verification.is_correct {
            self.state = TrackerState::Presenting(index);
            info!(session_id = %self.session.id(), step = index, "Answer not accepted");
            return Ok(StepOutcome::Retry {
                feedback: verification.feedback,
                hint: verification.hint.filter(|h| !h.trim().is_empty()),
            });
        }

        let session_id = self.session.id();
        let Some(updated) = self.store.update_progress(session_id, index + 1).await else {
            self.state = TrackerState::Presenting(index);
            return Err(TutorError::SessionNotFound(session_id));
        };
        self.session = updated;
        self.state = state_for(&self.session);

        match self.state {
            TrackerState::Completed => Ok(StepOutcome::Completed {
                final_solution: self.session.final_solution().unwrap_or_default().to_string(),
                feedback: verification.feedback,
            }),
            TrackerState::Presenting(next_index) | TrackerState::Verifying(next_index) => {
                Ok(StepOutcome::Advanced { next_index, feedback: verification.feedback })
            }
        }
    }

    async fn check(&self, step: &ReasoningStep, answer: &str) -> TutorResult<Verification> {
        let call = self.model.verify(&step.explanation, &step.check_question, answer);
        match tokio::time::timeout(self.store.model_timeout(), call).await {
            Ok(Ok(verification)) => Ok(verification),
            Ok(Err(e)) => {
                error!(session_id = %self.session.id(), "Answer verification failed: {}", e);
                Err(TutorError::VerificationFailure)
            }
            Err(_) => {
                error!(session_id = %self.session.id(), "Answer verification timed out");
                Err(TutorError::VerificationFailure)
            }
        }
    }
}

fn state_for(session: &Session) -> TrackerState {
    if session.is_complete() {
        TrackerState::Completed
    } else {
        TrackerState::Presenting(session.current_step_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decomposition, Field};
    use crate::ports::{PortError, PortResult};
    use crate::session_store::SessionStoreConfig;
    use crate::storage::MemoryKeyValueStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays scripted verification results in order.
    struct ScriptedModel {
        verdicts: Mutex<VecDeque<PortResult<Verification>>>,
    }

    impl ScriptedModel {
        fn new(verdicts: Vec<PortResult<Verification>>) -> Self {
            Self { verdicts: Mutex::new(verdicts.into()) }
        }
    }

    fn correct() -> PortResult<Verification> {
        Ok(Verification { is_correct: true, feedback: "Right.".to_string(), hint: None })
    }

    #[async_trait]
    impl TutorModelService for ScriptedModel {
        async fn decompose(
            &self,
            _field: Field,
            _problem: &str,
            _image_data: Option<&str>,
            _enhanced_thinking: bool,
        ) -> PortResult<Decomposition> {
            Ok(Decomposition {
                steps: (0..3)
                    .map(|i| ReasoningStep {
                        explanation: format!("e{i}"),
                        check_question: format!("q{i}"),
                    })
                    .collect(),
                final_solution: "done".to_string(),
            })
        }

        async fn verify(
            &self,
            _explanation: &str,
            _check_question: &str,
            _answer: &str,
        ) -> PortResult<Verification> {
            self.verdicts
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(PortError::Unavailable))
        }
    }

    const LEARNER: Uuid = Uuid::from_u128(1);

    async fn setup(verdicts: Vec<PortResult<Verification>>) -> (Arc<SessionStore>, Arc<ScriptedModel>, Uuid) {
        let model = Arc::new(ScriptedModel::new(verdicts));
        let store = Arc::new(
            SessionStore::init(
                Arc::new(MemoryKeyValueStore::new()),
                model.clone(),
                SessionStoreConfig::default(),
            )
            .await,
        );
        let id = store
            .create_session(LEARNER, Field::Philosophy, "What is knowledge?", None, false)
            .await
            .unwrap()
            .id();
        (store, model, id)
    }

    #[tokio::test]
    async fn resume_enters_persisted_step() {
        let (store, model, id) = setup(vec![]).await;
        store.update_progress(id, 2).await;

        let tracker = StepTracker::resume(store, model, LEARNER, id).await.unwrap();
        assert_eq!(tracker.state(), TrackerState::Presenting(2));
        assert_eq!(tracker.current_step().unwrap().check_question, "q2");
        assert_eq!(tracker.final_solution(), None);
    }

    #[tokio::test]
    async fn resume_finished_session_is_completed() {
        let (store, model, id) = setup(vec![]).await;
        store.update_progress(id, 3).await;

        let mut tracker = StepTracker::resume(store, model, LEARNER, id).await.unwrap();
        assert_eq!(tracker.state(), TrackerState::Completed);
        assert_eq!(tracker.final_solution(), Some("done"));
        assert!(matches!(
            tracker.submit_answer("again").await,
            Err(TutorError::SessionCompleted)
        ));
    }

    #[tokio::test]
    async fn correct_answer_advances_and_persists() {
        let (store, model, id) = setup(vec![correct()]).await;
        let mut tracker = StepTracker::resume(store.clone(), model, LEARNER, id).await.unwrap();

        let outcome = tracker.submit_answer("justified true belief").await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Advanced { next_index: 1, feedback: "Right.".to_string() }
        );
        assert_eq!(tracker.state(), TrackerState::Presenting(1));
        assert_eq!(store.get_session(LEARNER, id).await.unwrap().current_step_index(), 1);
    }

    #[tokio::test]
    async fn failed_verification_keeps_position() {
        let (store, model, id) = setup(vec![
            Err(PortError::Unexpected("503".to_string())),
            Ok(Verification { is_correct: false, feedback: "Not quite".to_string(), hint: Some("  ".to_string()) }),
        ])
        .await;
        let mut tracker = StepTracker::resume(store.clone(), model, LEARNER, id).await.unwrap();

        let err = tracker.submit_answer("anything").await.unwrap_err();
        assert!(matches!(err, TutorError::VerificationFailure));
        assert_eq!(tracker.state(), TrackerState::Presenting(0));
        assert_eq!(store.get_session(LEARNER, id).await.unwrap().current_step_index(), 0);

        let outcome = tracker.submit_answer("anything").await.unwrap();
        assert_eq!(outcome, StepOutcome::Retry { feedback: "Not quite".to_string(), hint: None });
        assert_eq!(tracker.state(), TrackerState::Presenting(0));
    }

    #[tokio::test]
    async fn blank_answer_is_rejected_locally() {
        let (store, model, id) = setup(vec![correct()]).await;
        let mut tracker = StepTracker::resume(store, model.clone(), LEARNER, id).await.unwrap();

        assert!(matches!(tracker.submit_answer("  \n").await, Err(TutorError::EmptyAnswer)));
        assert_eq!(model.verdicts.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_cannot_be_resumed() {
        let (store, model, _) = setup(vec![]).await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            StepTracker::resume(store, model, LEARNER, missing).await,
            Err(TutorError::SessionNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn another_users_session_cannot_be_resumed() {
        let (store, model, id) = setup(vec![correct()]).await;
        let stranger = Uuid::from_u128(2);
        assert!(matches!(
            StepTracker::resume(store.clone(), model.clone(), stranger, id).await,
            Err(TutorError::SessionNotFound(missing)) if missing == id
        ));
        assert_eq!(model.verdicts.lock().await.len(), 1);
        assert_eq!(store.get_session(LEARNER, id).await.unwrap().current_step_index(), 0);
    }
}
