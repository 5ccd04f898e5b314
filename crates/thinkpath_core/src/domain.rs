//! crates/thinkpath_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! Records that are persisted to key-value storage carry their serde layout here;
//! everything else is independent of any storage or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Subject Fields
//=========================================================================================

/// The subject-domain tag attached to every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Mathematics,
    Physics,
    #[serde(rename = "Computer Science")]
    ComputerScience,
    Chemistry,
    Philosophy,
    #[default]
    General,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Mathematics => "Mathematics",
            Field::Physics => "Physics",
            Field::ComputerScience => "Computer Science",
            Field::Chemistry => "Chemistry",
            Field::Philosophy => "Philosophy",
            Field::General => "General",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Reasoning Sessions
//=========================================================================================

/// One unit of guided explanation paired with a comprehension-check question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningStep {
    pub explanation: String,
    pub check_question: String,
}

/// The result of asking the model to break a problem into reasoning steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decomposition {
    pub steps: Vec<ReasoningStep>,
    pub final_solution: String,
}

/// The model's judgement of a learner's answer to a check question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_correct: bool,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A single problem-solving attempt.
///
/// Everything except `current_step_index` is fixed at creation, so those fields
/// are private and only readable. The index can only be moved forward through
/// [`Session::advance_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: Uuid,
    /// The user who started the session. Records saved before ownership was
    /// tracked load with the nil id and belong to nobody.
    #[serde(default)]
    owner: Uuid,
    field: Field,
    problem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_data: Option<String>,
    steps: Vec<ReasoningStep>,
    final_solution: String,
    current_step_index: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    enhanced_thinking: bool,
}

impl Session {
    /// Builds a fresh session at step zero from a validated decomposition.
    pub fn new(
        owner: Uuid,
        field: Field,
        problem: String,
        image_data: Option<String>,
        decomposition: Decomposition,
        enhanced_thinking: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            field,
            problem,
            image_data,
            steps: decomposition.steps,
            final_solution: decomposition.final_solution,
            current_step_index: 0,
            timestamp: Utc::now(),
            enhanced_thinking,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn problem(&self) -> &str {
        &self.problem
    }

    pub fn image_data(&self) -> Option<&str> {
        self.image_data.as_deref()
    }

    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&ReasoningStep> {
        self.steps.get(index)
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn enhanced_thinking(&self) -> bool {
        self.enhanced_thinking
    }

    pub fn is_complete(&self) -> bool {
        self.current_step_index == self.steps.len()
    }

    /// The final solution, only once every step has been completed.
    pub fn final_solution(&self) -> Option<&str> {
        self.is_complete().then_some(self.final_solution.as_str())
    }

    /// Moves the progress marker forward.
    ///
    /// The index is clamped to `steps.len()` and never decreases. Returns `true`
    /// when the stored index actually changed.
    pub fn advance_to(&mut self, new_index: usize) -> bool {
        let target = new_index.min(self.steps.len());
        if target <= self.current_step_index {
            return false;
        }
        self.current_step_index = target;
        true
    }

    /// Repairs records loaded from storage whose index is out of range.
    pub(crate) fn clamp_progress(&mut self) -> bool {
        if self.current_step_index > self.steps.len() {
            self.current_step_index = self.steps.len();
            return true;
        }
        false
    }
}

//=========================================================================================
// Identities and Tokens
//=========================================================================================

/// A registered user as stored in the vault. Contains sensitive data and never
/// leaves the access-control component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// The public view of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&Identity> for UserProfile {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
        }
    }
}

/// The payload segment of a session token. Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: Uuid,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

/// A successful signup or login: who the user is plus their bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: UserProfile,
    pub token: String,
}

/// Consecutive failed login attempts, persisted in the short-lived scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitWindow {
    pub count: u32,
    /// Epoch milliseconds of the most recent attempt.
    pub last_attempt: i64,
}

//=========================================================================================
// Assistant Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Model,
}

/// One entry of an assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Model, text: text.into() }
    }
}
