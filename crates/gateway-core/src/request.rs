//! Request types for the gateway.
//!
//! `InferenceRequest` is the body a client posts to a routed path. It is
//! turned into one `BackendRequest` per attempt, carrying the backend's
//! model and generation parameters.

use crate::error::GatewayError;
use crate::types::{MaxTokens, Temperature};
use serde::{Deserialize, Serialize};

/// Client request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Single-turn prompt, appended as the final user message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Conversation history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChatMessage>,

    /// Model requested by the client; honoured only on self-hosted backends
    /// of routes that allow it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Client cap on output tokens; never raises the backend's configured max
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// End-user identifier, recorded in the audit trail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl InferenceRequest {
    /// Request with a single prompt
    #[must_use]
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Ask for a specific model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the client output cap
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Validate the request
    ///
    /// # Errors
    /// Returns a validation error when there is no non-empty prompt or
    /// message, or when `max_tokens` is out of range
    pub fn validate(&self) -> Result<(), GatewayError> {
        let has_prompt = self
            .prompt
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        let has_message = self.messages.iter().any(|m| !m.content.trim().is_empty());

        if !has_prompt && !has_message {
            return Err(GatewayError::validation(
                "Request must contain a non-empty prompt or at least one message",
                Some("prompt".to_string()),
                "missing_prompt",
            ));
        }

        if let Some(max) = self.max_tokens {
            MaxTokens::new(max)?;
        }

        Ok(())
    }

    /// The conversation as sent to a backend: messages followed by the
    /// prompt as a final user turn
    #[must_use]
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        if let Some(prompt) = self.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            messages.push(ChatMessage::user(prompt));
        }
        messages
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Request sent to a single backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// Model identifier
    pub model: String,
    /// Conversation
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: Temperature,
    /// Effective output token cap
    pub max_tokens: MaxTokens,
}

impl BackendRequest {
    /// System messages joined with blank lines, for providers that take
    /// the system prompt out of band
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Non-system messages, in order
    pub fn conversation(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role != MessageRole::System)
    }
}
