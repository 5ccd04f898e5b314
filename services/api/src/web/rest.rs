//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the reasoning-session endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{auth, media, state::AppState, ErrorBody, Rejection};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thinkpath_core::{Field, Session, StepOutcome, StepTracker, TokenClaims, TutorError};
use tracing::info;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::password_reset_handler,
        list_sessions_handler,
        create_session_handler,
        get_session_handler,
        submit_answer_handler,
        media::speech_handler,
        media::transcribe_handler,
        media::chat_handler,
    ),
    components(
        schemas(
            ErrorBody,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::PasswordResetRequest,
            auth::UserView,
            auth::AuthResponse,
            auth::MessageResponse,
            CreateSessionRequest,
            SessionView,
            StepView,
            AnswerRequest,
            AnswerResponse,
            media::SpeechRequest,
            media::TranscriptionResponse,
            media::ChatRequest,
            media::ChatMessageView,
            media::ChatResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "ThinkPath API", description = "Guided step-by-step reasoning sessions.")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// One of Mathematics, Physics, Computer Science, Chemistry, Philosophy, General.
    #[serde(default)]
    #[schema(value_type = String)]
    pub field: Field,
    pub problem: String,
    /// Base64 image, either bare or as a `data:` URL.
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub enhanced_thinking: bool,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub index: usize,
    pub explanation: String,
    pub check_question: String,
}

/// A saved session as the learner sees it: only steps up to the current one are revealed.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub field: String,
    pub problem: String,
    pub has_image: bool,
    pub steps: Vec<StepView>,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub is_complete: bool,
    pub final_solution: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: DateTime<Utc>,
    pub enhanced_thinking: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let revealed = (session.current_step_index() + 1).min(session.steps().len());
        Self {
            id: session.id(),
            field: session.field().to_string(),
            problem: session.problem().to_string(),
            has_image: session.image_data().is_some(),
            steps: session.steps()[..revealed]
                .iter()
                .enumerate()
                .map(|(index, step)| StepView {
                    index,
                    explanation: step.explanation.clone(),
                    check_question: step.check_question.clone(),
                })
                .collect(),
            current_step_index: session.current_step_index(),
            total_steps: session.steps().len(),
            is_complete: session.is_complete(),
            final_solution: session.final_solution().map(str::to_string),
            timestamp: session.timestamp(),
            enhanced_thinking: session.enhanced_thinking(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerRequest {
    pub answer: String,
}

/// The verdict on one answer plus the session as it now stands.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    /// `advanced`, `completed` or `retry`.
    pub outcome: String,
    pub feedback: String,
    pub hint: Option<String>,
    pub session: SessionView,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the caller's saved sessions, most recent first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Saved sessions", body = [SessionView]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
) -> Json<Vec<SessionView>> {
    let sessions = app_state.sessions.list_sessions(claims.sub).await;
    Json(sessions.iter().map(SessionView::from).collect())
}

/// Start a new reasoning session from a problem statement.
///
/// The model breaks the problem into steps; nothing is saved if that fails.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionView),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 422, description = "The problem could not be decomposed", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let image_data = req.image_data.filter(|data| !data.trim().is_empty());
    let session = app_state
        .sessions
        .create_session(
            claims.sub,
            req.field,
            &req.problem,
            image_data,
            req.enhanced_thinking,
        )
        .await?;
    info!(session_id = %session.id(), steps = session.steps().len(), "Session created");
    Ok((StatusCode::CREATED, Json(SessionView::from(&session))))
}

/// Fetch one of the caller's saved sessions.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "The session id.")),
    responses(
        (status = 200, description = "The session", body = SessionView),
        (status = 404, description = "No such session, or it belongs to someone else", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, Rejection> {
    let session = app_state
        .sessions
        .get_session(claims.sub, id)
        .await
        .ok_or(TutorError::SessionNotFound(id))?;
    Ok(Json(SessionView::from(&session)))
}

/// Answer the current step's understanding check.
///
/// A correct answer moves the session forward; an incorrect one returns feedback
/// and possibly a hint while the step stays the same.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answer",
    params(("id" = Uuid, Path, description = "The session id.")),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "The answer was checked", body = AnswerResponse),
        (status = 400, description = "The answer was blank", body = ErrorBody),
        (status = 404, description = "No such session", body = ErrorBody),
        (status = 409, description = "The session is already complete", body = ErrorBody),
        (status = 502, description = "The answer could not be checked; progress is unchanged", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn submit_answer_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, Rejection> {
    let mut tracker = StepTracker::resume(
        app_state.sessions.clone(),
        app_state.tutor.clone(),
        claims.sub,
        id,
    )
    .await?;
    let outcome = tracker.submit_answer(&req.answer).await?;

    let (outcome, feedback, hint) = match outcome {
        StepOutcome::Advanced { feedback, .. } => ("advanced", feedback, None),
        StepOutcome::Completed { feedback, .. } => ("completed", feedback, None),
        StepOutcome::Retry { feedback, hint } => ("retry", feedback, hint),
    };

    Ok(Json(AnswerResponse {
        outcome: outcome.to_string(),
        feedback,
        hint,
        session: SessionView::from(tracker.session()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use thinkpath_core::{
        AccessControl, AuthConfig, ChatMessage, ChatService, ConversationRegistry, Decomposition,
        MemoryKeyValueStore, PortError, PortResult, ReasoningStep, SessionStore,
        SessionStoreConfig, SpeechToTextService, TutorModelService, Verification,
    };

    /// Decomposes everything into three steps and accepts every answer.
    struct AgreeableTutor;

    #[async_trait]
    impl TutorModelService for AgreeableTutor {
        async fn decompose(
            &self,
            _field: Field,
            _problem: &str,
            _image_data: Option<&str>,
            _enhanced_thinking: bool,
        ) -> PortResult<Decomposition> {
            Ok(decomposition(3))
        }

        async fn verify(
            &self,
            _explanation: &str,
            _check_question: &str,
            _answer: &str,
        ) -> PortResult<Verification> {
            Ok(Verification { is_correct: true, feedback: "Right.".to_string(), hint: None })
        }
    }

    struct Offline;

    #[async_trait]
    impl SpeechToTextService for Offline {
        async fn transcribe_audio(&self, _audio_data: &[u8], _mime_type: &str) -> PortResult<String> {
            Err(PortError::Unavailable)
        }
    }

    #[async_trait]
    impl ChatService for Offline {
        async fn reply(&self, _history: &[ChatMessage], _message: &str) -> PortResult<String> {
            Err(PortError::Unavailable)
        }
    }

    async fn app_state() -> Arc<AppState> {
        let tutor = Arc::new(AgreeableTutor);
        let sessions = SessionStore::init(
            Arc::new(MemoryKeyValueStore::new()),
            tutor.clone(),
            SessionStoreConfig::default(),
        )
        .await;
        let access = AccessControl::init(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(MemoryKeyValueStore::new()),
            AuthConfig::new("rest-handler-test-secret-0123456789"),
        )
        .unwrap();
        Arc::new(AppState {
            sessions: Arc::new(sessions),
            access: Arc::new(access),
            tutor,
            sst: Arc::new(Offline),
            tts: None,
            conversations: ConversationRegistry::new(Arc::new(Offline), 4),
        })
    }

    fn claims(name: &str) -> TokenClaims {
        TokenClaims { sub: Uuid::new_v4(), name: name.to_string(), iat: 0, exp: i64::MAX }
    }

    fn decomposition(steps: usize) -> Decomposition {
        Decomposition {
            steps: (0..steps)
                .map(|i| ReasoningStep {
                    explanation: format!("explain {}", i),
                    check_question: format!("check {}", i),
                })
                .collect(),
            final_solution: "x = 2".to_string(),
        }
    }

    fn session(steps: usize) -> Session {
        Session::new(
            Uuid::new_v4(),
            Field::Mathematics,
            "2x = 4".to_string(),
            None,
            decomposition(steps),
            false,
        )
    }

    #[test]
    fn only_reached_steps_are_revealed() {
        let mut session = session(4);
        session.advance_to(2);
        let view = SessionView::from(&session);
        assert_eq!(view.steps.len(), 3);
        assert_eq!(view.total_steps, 4);
        assert!(!view.is_complete);
        assert!(view.final_solution.is_none());
    }

    #[test]
    fn completed_session_shows_everything() {
        let mut session = session(3);
        session.advance_to(3);
        let view = SessionView::from(&session);
        assert_eq!(view.steps.len(), 3);
        assert!(view.is_complete);
        assert_eq!(view.final_solution.as_deref(), Some("x = 2"));
    }

    #[test]
    fn create_request_defaults() {
        let req: CreateSessionRequest =
            serde_json::from_str(r#"{"problem": "Why is the sky blue?"}"#).unwrap();
        assert_eq!(req.field, Field::General);
        assert!(req.image_data.is_none());
        assert!(!req.enhanced_thinking);

        let req: CreateSessionRequest = serde_json::from_str(
            r#"{"field": "Computer Science", "problem": "p", "enhancedThinking": true}"#,
        )
        .unwrap();
        assert_eq!(req.field, Field::ComputerScience);
        assert!(req.enhanced_thinking);
    }

    #[tokio::test]
    async fn other_users_sessions_are_hidden_and_untouchable() {
        let state = app_state().await;
        let (alice, bob) = (claims("Alice"), claims("Bob"));
        let id = state
            .sessions
            .create_session(alice.sub, Field::Mathematics, "2x = 4", None, false)
            .await
            .unwrap()
            .id();

        let Json(listed) =
            list_sessions_handler(State(state.clone()), Extension(bob.clone())).await;
        assert!(listed.is_empty());

        let Err(rejection) =
            get_session_handler(State(state.clone()), Extension(bob.clone()), Path(id)).await
        else {
            panic!("another user's session must not be readable");
        };
        assert_eq!(rejection.status(), StatusCode::NOT_FOUND);

        let Err(rejection) = submit_answer_handler(
            State(state.clone()),
            Extension(bob),
            Path(id),
            Json(AnswerRequest { answer: "x = 2".to_string() }),
        )
        .await
        else {
            panic!("another user's session must not be answerable");
        };
        assert_eq!(rejection.status(), StatusCode::NOT_FOUND);

        // The owner still sees it, untouched.
        let Json(view) = get_session_handler(State(state.clone()), Extension(alice.clone()), Path(id))
            .await
            .map_err(|r| r.status())
            .unwrap();
        assert_eq!(view.current_step_index, 0);
        let Json(listed) = list_sessions_handler(State(state), Extension(alice)).await;
        assert_eq!(listed.len(), 1);
    }
}
