//! crates/thinkpath_core/src/chat.rs
//!
//! The open-ended assistant conversation. It sits outside the tutoring state
//! machine; its only rule is that every user message is answered by exactly one
//! model message, even when the model call fails.
//!
//! Conversations are bounded twice: each keeps the greeting plus its most recent
//! turns, and the registry keeps a fixed number of conversations, dropping the
//! least recently used one when a new user arrives.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::domain::ChatMessage;
use crate::ports::ChatService;

pub const GREETING: &str = "Greetings. I am the ThinkPath Reasoning Engine. My protocol is simple: I don't just provide answers. I help you deconstruct complexity through first-principles logic. Shall we initiate a reasoning path today?";

pub const CONNECTION_INTERRUPTED: &str =
    "System connection interrupted. Re-synchronizing logic vault...";

/// Messages kept after the greeting. Even, so turns are dropped whole.
pub const HISTORY_WINDOW: usize = 20;

pub const DEFAULT_CONVERSATION_CAPACITY: usize = 1_000;

pub struct ChatConversation {
    service: Arc<dyn ChatService>,
    messages: Vec<ChatMessage>,
}

impl ChatConversation {
    /// Starts a conversation with the assistant's greeting.
    pub fn new(service: Arc<dyn ChatService>) -> Self {
        Self {
            service,
            messages: vec![ChatMessage::model(GREETING)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Sends `message` and returns the model's reply as appended to the history.
    /// Blank messages are ignored and return `None`.
    pub async fn send(&mut self, message: &str) -> Option<&ChatMessage> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }

        let reply = match self.service.reply(&self.messages, message).await {
            Ok(text) => text,
            Err(e) => {
                error!("Assistant chat failed: {}", e);
                CONNECTION_INTERRUPTED.to_string()
            }
        };
        self.messages.push(ChatMessage::user(message));
        self.messages.push(ChatMessage::model(reply));

        let excess = self.messages.len().saturating_sub(HISTORY_WINDOW + 1);
        if excess > 0 {
            self.messages.drain(1..=excess);
        }
        self.messages.last()
    }
}

type SharedConversation = Arc<Mutex<ChatConversation>>;

/// One conversation per user, at most `capacity` of them.
pub struct ConversationRegistry {
    service: Arc<dyn ChatService>,
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    tick: u64,
    entries: HashMap<Uuid, (SharedConversation, u64)>,
}

impl ConversationRegistry {
    /// A `capacity` of zero is treated as one.
    pub fn new(service: Arc<dyn ChatService>, capacity: usize) -> Self {
        Self {
            service,
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Returns the user's conversation, starting a new one on first use.
    pub async fn conversation(&self, user_id: Uuid) -> SharedConversation {
        let mut inner = self.inner.lock().await;
        inner.tick += 1;
        let tick = inner.tick;

        if let Some((conversation, last_used)) = inner.entries.get_mut(&user_id) {
            *last_used = tick;
            return conversation.clone();
        }

        if inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                debug!(user_id = %oldest, "Dropped least recently used conversation");
            }
        }

        let conversation = Arc::new(Mutex::new(ChatConversation::new(self.service.clone())));
        inner.entries.insert(user_id, (conversation.clone(), tick));
        conversation
    }

    pub async fn conversation_count(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
