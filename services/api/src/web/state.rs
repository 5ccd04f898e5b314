//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;
use thinkpath_core::{
    AccessControl, ConversationRegistry, SessionStore, SpeechToTextService, TextToSpeechService,
    TutorModelService,
};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub access: Arc<AccessControl>,
    pub tutor: Arc<dyn TutorModelService>,
    pub sst: Arc<dyn SpeechToTextService>,
    /// `None` when read-aloud is switched off.
    pub tts: Option<Arc<dyn TextToSpeechService>>,
    /// One assistant conversation per signed-in user, held in memory.
    pub conversations: ConversationRegistry,
}
