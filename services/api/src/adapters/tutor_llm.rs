//! services/api/src/adapters/tutor_llm.rs
//!
//! This module contains the adapter for the tutoring LLM.
//! It implements the `TutorModelService` port from the `core` crate: breaking a
//! problem into reasoning steps and judging a learner's answer to one step.

const SYSTEM_INSTRUCTIONS: &str = r#"You are ThinkPath AI, a guided reasoning and understanding-first learning platform.
Tagline: "Understand first. Answer later."

Your purpose is to help learners build conceptual clarity.
You act as a disciplined mentor.

CORE RULES:
- Never give final answers immediately.
- Guide using questions and reasoning steps.
- Be concise and efficient in your explanations.
- Always respond with a single JSON object and nothing else."#;

const DECOMPOSE_TEMPLATE: &str = r#"Analyze this {field} problem.
Problem: "{problem}"

Break this down into 3-5 progressive reasoning blocks.
For each, provide: 1. Guided reasoning explanation 2. A specific "Understanding Check" question.

Return JSON: { "steps": [{ "explanation": string, "checkQuestion": string }], "finalSolution": string }"#;

const VERIFY_TEMPLATE: &str = r#"Evaluate this learner's response for the following concept.
Context: {explanation}
Question: {question}
User Answer: "{answer}"

Return JSON: { "isCorrect": boolean, "feedback": string, "hint"?: string }"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageUrlArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use thinkpath_core::{
    domain::{Decomposition, Field, Verification},
    ports::{PortError, PortResult, TutorModelService},
};
use tracing::debug;

static CODE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").ok());

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TutorModelService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTutorAdapter {
    client: Client<OpenAIConfig>,
    fast_model: String,
    deep_model: String,
}

impl OpenAiTutorAdapter {
    /// Creates a new `OpenAiTutorAdapter`.
    ///
    /// `deep_model` is used for decompositions requested with enhanced thinking;
    /// everything else uses `fast_model`.
    pub fn new(client: Client<OpenAIConfig>, fast_model: String, deep_model: String) -> Self {
        Self {
            client,
            fast_model,
            deep_model,
        }
    }

    /// Sends one system + user exchange in JSON mode and returns the raw reply text.
    async fn complete_json(
        &self,
        model: &str,
        user_parts: Vec<ChatCompletionRequestUserMessageContentPart>,
    ) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_parts)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .response_format(ResponseFormat::JsonObject)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
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
            .ok_or_else(|| PortError::Malformed("Tutor LLM returned no content.".to_string()))
    }
}

fn text_part(text: String) -> PortResult<ChatCompletionRequestUserMessageContentPart> {
    Ok(ChatCompletionRequestMessageContentPartTextArgs::default()
        .text(text)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

fn image_part(image_data: &str) -> PortResult<ChatCompletionRequestUserMessageContentPart> {
    let url = image_data_url(image_data);
    let image_url = ImageUrlArgs::default()
        .url(url)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    Ok(ChatCompletionRequestMessageContentPartImageArgs::default()
        .image_url(image_url)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

/// Accepts either a `data:` URL or bare base64 (assumed JPEG).
fn image_data_url(image_data: &str) -> String {
    let image_data = image_data.trim();
    if image_data.starts_with("data:") {
        image_data.to_string()
    } else {
        format!("data:image/jpeg;base64,{}", image_data)
    }
}

/// Parses a JSON reply, tolerating a surrounding markdown code fence.
///
/// Missing required fields fail here rather than being discovered later.
fn parse_reply<T: DeserializeOwned>(raw: &str) -> PortResult<T> {
    let body = CODE_FENCE
        .as_ref()
        .and_then(|fence| fence.captures(raw))
        .and_then(|captures| captures.get(1))
        .map_or(raw, |body| body.as_str());
    serde_json::from_str(body).map_err(|e| PortError::Malformed(e.to_string()))
}

//=========================================================================================
// `TutorModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TutorModelService for OpenAiTutorAdapter {
    async fn decompose(
        &self,
        field: Field,
        problem: &str,
        image_data: Option<&str>,
        enhanced_thinking: bool,
    ) -> PortResult<Decomposition> {
        let prompt = DECOMPOSE_TEMPLATE
            .replace("{field}", field.as_str())
            .replace("{problem}", problem);

        let mut parts = vec![text_part(prompt)?];
        if let Some(image_data) = image_data {
            parts.push(image_part(image_data)?);
        }

        let model = if enhanced_thinking {
            &self.deep_model
        } else {
            &self.fast_model
        };
        debug!(model = %model, field = %field, "Requesting problem decomposition");

        let raw = self.complete_json(model, parts).await?;
        parse_reply(&raw)
    }

    async fn verify(
        &self,
        explanation: &str,
        check_question: &str,
        answer: &str,
    ) -> PortResult<Verification> {
        let prompt = VERIFY_TEMPLATE
            .replace("{explanation}", explanation)
            .replace("{question}", check_question)
            .replace("{answer}", answer);

        let raw = self.complete_json(&self.fast_model, vec![text_part(prompt)?]).await?;
        parse_reply(&raw)
    }
}
