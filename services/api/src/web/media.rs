//! services/api/src/web/media.rs
//!
//! Voice and assistant-chat endpoints: reading text aloud, transcribing a
//! spoken answer, and the free-form ThinkPath assistant.

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thinkpath_core::{ChatMessage, ChatRole, TokenClaims};
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::web::{state::AppState, ErrorBody, Rejection};

/// MIME type assumed when an audio part does not declare one.
const DEFAULT_AUDIO_MIME: &str = "audio/webm";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SpeechRequest {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatMessageView {
    /// `user` or `model`.
    pub role: String,
    pub text: String,
}

impl From<&ChatMessage> for ChatMessageView {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        };
        Self {
            role: role.to_string(),
            text: message.text.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub reply: ChatMessageView,
    /// The conversation so far: the greeting, then the most recent turns.
    pub messages: Vec<ChatMessageView>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Read text aloud.
///
/// Returns MP3 audio, or 204 when speech is switched off or synthesis fails.
#[utoipa::path(
    post,
    path = "/speech",
    request_body = SpeechRequest,
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg"),
        (status = 204, description = "Speech unavailable")
    ),
    security(("bearer" = []))
)]
pub async fn speech_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeechRequest>,
) -> Response {
    let Some(tts) = state.tts.as_ref() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match tts.generate_audio(&req.text).await {
        Ok(audio) => ([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response(),
        Err(e) => {
            warn!("Speech synthesis failed: {}", e);
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

/// Transcribe a spoken answer.
///
/// Accepts multipart/form-data with a single audio part; its content type selects
/// the decoding (`audio/pcm` is raw 16-bit 48 kHz mono).
#[utoipa::path(
    post,
    path = "/transcribe",
    request_body(content_type = "multipart/form-data", description = "The recorded audio."),
    responses(
        (status = 200, description = "Transcribed text", body = TranscriptionResponse),
        (status = 400, description = "No audio part was sent", body = ErrorBody),
        (status = 502, description = "Transcription failed", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn transcribe_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, Rejection> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| Rejection::bad_request(format!("Failed to read multipart data: {}", e)))?
        .ok_or_else(|| Rejection::bad_request("Multipart form must include an audio part"))?;

    let mime_type = field
        .content_type()
        .unwrap_or(DEFAULT_AUDIO_MIME)
        .to_string();
    let audio = field
        .bytes()
        .await
        .map_err(|e| Rejection::bad_request(format!("Failed to read audio bytes: {}", e)))?;

    let text = state
        .sst
        .transcribe_audio(&audio, &mime_type)
        .await
        .map_err(|e| {
            error!("Transcription failed: {}", e);
            Rejection::new(StatusCode::BAD_GATEWAY, "Audio could not be transcribed.")
        })?;

    Ok(Json(TranscriptionResponse { text }))
}

/// Talk to the ThinkPath assistant.
///
/// Every message gets exactly one reply, even when the model is unreachable.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The assistant's reply", body = ChatResponse),
        (status = 400, description = "The message was blank", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, Rejection> {
    let conversation = state.conversations.conversation(claims.sub).await;
    let mut conversation = conversation.lock().await;

    let reply = conversation
        .send(&req.message)
        .await
        .map(ChatMessageView::from)
        .ok_or_else(|| Rejection::bad_request("A message is required."))?;

    Ok(Json(ChatResponse {
        reply,
        messages: conversation
            .messages()
            .iter()
            .map(ChatMessageView::from)
            .collect(),
    }))
}
