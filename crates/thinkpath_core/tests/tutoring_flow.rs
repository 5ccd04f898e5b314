//! End-to-end walk through a four-step reasoning session, including a wrong
//! answer, a failed verification call and a reload mid-session.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use thinkpath_core::{
    Decomposition, Field, KeyValueStore, MemoryKeyValueStore, PortError, PortResult, ReasoningStep,
    SessionStore, SessionStoreConfig, StepOutcome, StepTracker, TrackerState, TutorError,
    TutorModelService, Verification,
};
use tokio::sync::Mutex;
use uuid::Uuid;

const LEARNER: Uuid = Uuid::from_u128(7);

struct FakeTutor {
    verdicts: Mutex<VecDeque<PortResult<Verification>>>,
    asked: Mutex<Vec<String>>,
}

impl FakeTutor {
    fn new(verdicts: Vec<PortResult<Verification>>) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(verdicts.into()),
            asked: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TutorModelService for FakeTutor {
    async fn decompose(
        &self,
        field: Field,
        problem: &str,
        _image_data: Option<&str>,
        _enhanced_thinking: bool,
    ) -> PortResult<Decomposition> {
        Ok(Decomposition {
            steps: (1..=4)
                .map(|n| ReasoningStep {
                    explanation: format!("{field} step {n} for {problem}"),
                    check_question: format!("Check {n}?"),
                })
                .collect(),
            final_solution: "x = 3".to_string(),
        })
    }

    async fn verify(
        &self,
        _explanation: &str,
        check_question: &str,
        _answer: &str,
    ) -> PortResult<Verification> {
        self.asked.lock().await.push(check_question.to_string());
        self.verdicts
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(PortError::Unavailable))
    }
}

fn correct() -> PortResult<Verification> {
    Ok(Verification {
        is_correct: true,
        feedback: "Exactly.".to_string(),
        hint: None,
    })
}

fn wrong() -> PortResult<Verification> {
    Ok(Verification {
        is_correct: false,
        feedback: "Look at the sign again.".to_string(),
        hint: Some("Subtract 2 from both sides first.".to_string()),
    })
}

#[tokio::test]
async fn four_step_session_runs_to_completion() {
    let tutor = FakeTutor::new(vec![correct(), correct(), correct(), wrong(), correct()]);
    let storage = Arc::new(MemoryKeyValueStore::new());
    let store = Arc::new(
        SessionStore::init(storage.clone(), tutor.clone(), SessionStoreConfig::default()).await,
    );

    let session = store
        .create_session(LEARNER, Field::Mathematics, "Solve 2x + 2 = 8", None, false)
        .await
        .unwrap();
    assert_eq!(session.steps().len(), 4);
    assert_eq!(session.current_step_index(), 0);

    let mut tracker = StepTracker::resume(store.clone(), tutor.clone(), LEARNER, session.id())
        .await
        .unwrap();
    for expected_next in 1..=3 {
        let outcome = tracker.submit_answer("my reasoning").await.unwrap();
        assert!(matches!(outcome, StepOutcome::Advanced { next_index, .. } if next_index == expected_next));
    }
    assert_eq!(tracker.state(), TrackerState::Presenting(3));

    let outcome = tracker.submit_answer("x = -3").await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Retry {
            feedback: "Look at the sign again.".to_string(),
            hint: Some("Subtract 2 from both sides first.".to_string()),
        }
    );
    assert_eq!(tracker.state(), TrackerState::Presenting(3));
    assert_eq!(store.get_session(LEARNER, session.id()).await.unwrap().current_step_index(), 3);
    assert_eq!(tracker.final_solution(), None);

    let outcome = tracker.submit_answer("x = 3").await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Completed {
            final_solution: "x = 3".to_string(),
            feedback: "Exactly.".to_string(),
        }
    );
    assert_eq!(tracker.state(), TrackerState::Completed);
    assert_eq!(tracker.final_solution(), Some("x = 3"));

    let stored = store.get_session(LEARNER, session.id()).await.unwrap();
    assert_eq!(stored.current_step_index(), 4);
    assert!(stored.is_complete());
    assert_eq!(stored.steps(), session.steps());

    assert_eq!(
        *tutor.asked.lock().await,
        vec!["Check 1?", "Check 2?", "Check 3?", "Check 4?", "Check 4?"]
    );

    let raw = storage.get("thinkpath_saved_sessions_v1").await.unwrap().unwrap();
    assert!(raw.contains("\"currentStepIndex\":4"));
}

#[tokio::test]
async fn reload_mid_session_resumes_at_saved_step() {
    let tutor = FakeTutor::new(vec![
        correct(),
        Err(PortError::Unexpected("gateway timeout".to_string())),
    ]);
    let storage = Arc::new(MemoryKeyValueStore::new());
    let store = Arc::new(
        SessionStore::init(storage.clone(), tutor.clone(), SessionStoreConfig::default()).await,
    );
    let id = store
        .create_session(LEARNER, Field::Physics, "Projectile range", None, true)
        .await
        .unwrap()
        .id();

    let mut tracker = StepTracker::resume(store.clone(), tutor.clone(), LEARNER, id).await.unwrap();
    tracker.submit_answer("first").await.unwrap();
    let err = tracker.submit_answer("second").await.unwrap_err();
    assert!(matches!(err, TutorError::VerificationFailure));
    assert_eq!(tracker.state(), TrackerState::Presenting(1));

    // A fresh store over the same storage stands in for a page reload.
    let reloaded = Arc::new(
        SessionStore::init(storage, tutor.clone(), SessionStoreConfig::default()).await,
    );
    let resumed = StepTracker::resume(reloaded, tutor, LEARNER, id).await.unwrap();
    assert_eq!(resumed.state(), TrackerState::Presenting(1));
    assert_eq!(resumed.current_step().unwrap().check_question, "Check 2?");
    assert!(resumed.session().enhanced_thinking());
}

#[tokio::test]
async fn slow_verification_times_out_without_progress() {
    struct Stalled;

    #[async_trait]
    impl TutorModelService for Stalled {
        async fn decompose(
            &self,
            _field: Field,
            _problem: &str,
            _image_data: Option<&str>,
            _enhanced_thinking: bool,
        ) -> PortResult<Decomposition> {
            Ok(Decomposition {
                steps: vec![ReasoningStep {
                    explanation: "e".to_string(),
                    check_question: "q".to_string(),
                }],
                final_solution: "s".to_string(),
            })
        }

        async fn verify(&self, _e: &str, _q: &str, _a: &str) -> PortResult<Verification> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Err(PortError::Unavailable)
        }
    }

    let model = Arc::new(Stalled);
    let config = SessionStoreConfig {
        model_timeout: std::time::Duration::from_millis(20),
        ..SessionStoreConfig::default()
    };
    let store = Arc::new(
        SessionStore::init(Arc::new(MemoryKeyValueStore::new()), model.clone(), config).await,
    );
    let id = store
        .create_session(LEARNER, Field::General, "q", None, false)
        .await
        .unwrap()
        .id();

    let mut tracker = StepTracker::resume(store.clone(), model, LEARNER, id).await.unwrap();
    assert!(matches!(
        tracker.submit_answer("a").await,
        Err(TutorError::VerificationFailure)
    ));
    assert_eq!(store.get_session(LEARNER, id).await.unwrap().current_step_index(), 0);
}
