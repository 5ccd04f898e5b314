//! crates/thinkpath_core/src/error.rs
//!
//! The error taxonomy surfaced by the core components. Messages are written for
//! end users and deliberately say nothing about which credential was wrong.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// Decomposition failed or came back incomplete. No session was created.
    #[error("Logical deconstruction failed. The system requires a clearer prompt to begin reasoning.")]
    AnalysisFailure,

    /// The answer could not be checked. Progress is unchanged and the user may retry.
    #[error("Your answer could not be checked right now. Please try again.")]
    VerificationFailure,

    #[error("Security Alert: An account with this identity already exists.")]
    DuplicateIdentity,

    #[error("Authentication Failed: Invalid email or password combination.")]
    InvalidCredentials,

    #[error("Access Denied: Too many failed attempts. Identity verification locked for {retry_after_secs}s.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Name, email and password are all required.")]
    InvalidSignup,

    #[error("Session token is invalid or expired.")]
    InvalidToken,

    /// Persisted data could not be parsed. Callers recover by treating it as empty.
    #[error("Stored data under '{0}' is unreadable.")]
    StorageCorruption(String),

    #[error("Storage is unavailable: {0}")]
    Storage(String),

    #[error("Session {0} not found.")]
    SessionNotFound(Uuid),

    #[error("This reasoning path is already complete.")]
    SessionCompleted,

    #[error("An answer is required.")]
    EmptyAnswer,

    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

pub type TutorResult<T> = Result<T, TutorError>;
