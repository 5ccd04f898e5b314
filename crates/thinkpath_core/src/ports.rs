//! crates/thinkpath_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like storage or model APIs.

use async_trait::async_trait;
use crate::domain::{ChatMessage, Decomposition, Field, Verification};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
/// It never crosses the core boundary: components convert it into a `TutorError`.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Capability unavailable")]
    Unavailable,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port
//=========================================================================================

/// A string-valued key-value store.
///
/// Two scopes are used: a durable one for sessions and the identity vault, and a
/// shorter-lived one for the per-client login rate-limit windows, which are
/// removed again after a successful login.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PortResult<()>;

    async fn remove(&self, key: &str) -> PortResult<()>;
}

//=========================================================================================
// Model Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TutorModelService: Send + Sync {
    /// Breaks a problem into ordered reasoning steps plus a final solution.
    async fn decompose(
        &self,
        field: Field,
        problem: &str,
        image_data: Option<&str>,
        enhanced_thinking: bool,
    ) -> PortResult<Decomposition>;

    /// Judges a learner's answer to one step's check question.
    async fn verify(
        &self,
        explanation: &str,
        check_question: &str,
        answer: &str,
    ) -> PortResult<Verification>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a slice of audio data into text.
    async fn transcribe_audio(&self, audio_data: &[u8], mime_type: &str) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Replies to `message` given the conversation so far.
    async fn reply(&self, history: &[ChatMessage], message: &str) -> PortResult<String>;
}
