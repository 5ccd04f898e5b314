pub mod access;
pub mod chat;
pub mod domain;
pub mod error;
pub mod ports;
pub mod session_store;
pub mod storage;
pub mod token;
pub mod tracker;

pub use access::{AccessControl, AuthConfig};
pub use chat::{ChatConversation, ConversationRegistry};
pub use domain::{
    AuthSession, ChatMessage, ChatRole, Decomposition, Field, Identity, RateLimitWindow,
    ReasoningStep, Session, TokenClaims, UserProfile, Verification,
};
pub use error::{TutorError, TutorResult};
pub use ports::{
    ChatService, KeyValueStore, PortError, PortResult, SpeechToTextService, TextToSpeechService,
    TutorModelService,
};
pub use session_store::{SessionStore, SessionStoreConfig};
pub use storage::MemoryKeyValueStore;
pub use tracker::{StepOutcome, StepTracker, TrackerState};
