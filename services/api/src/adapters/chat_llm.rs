//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the free-form assistant chat.
//! It implements the `ChatService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = "You are ThinkPath Assistant, a helpful AI mentor. \
Help users with their learning questions, explain concepts, and guide them through \
their reasoning. Be concise, encouraging, and focus on building understanding rather \
than just giving answers.";

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use thinkpath_core::{
    domain::{ChatMessage, ChatRole},
    ports::{ChatService, PortError, PortResult},
};

/// An adapter that implements `ChatService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn history_message(message: &ChatMessage) -> PortResult<ChatCompletionRequestMessage> {
    let converted = match message.role {
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.text.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
        ChatRole::Model => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.text.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    };
    Ok(converted)
}

#[async_trait]
impl ChatService for OpenAiChatAdapter {
    async fn reply(&self, history: &[ChatMessage], message: &str) -> PortResult<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
        for previous in history {
            messages.push(history_message(previous)?);
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(message)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| PortError::Malformed("Chat model returned no content.".to_string()))
    }
}
