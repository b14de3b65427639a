//! OpenAI backend.
//!
//! Talks to the Chat Completions API (`POST /v1/chat/completions`), or to
//! any compatible server through a base URL override.

use crate::http::{build_client, execute, usage_or_estimate};
use async_trait::async_trait;
use gateway_core::{
    Backend, BackendDescriptor, BackendRequest, BackendResponse, GatewayError, MessageRole,
    ProviderKind,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// OpenAI chat completions client for one backend
pub struct OpenAIBackend {
    descriptor: Arc<BackendDescriptor>,
    api_key: SecretString,
    base_url: String,
    client: Client,
}

impl OpenAIBackend {
    /// Create the client of `descriptor`
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(
        descriptor: Arc<BackendDescriptor>,
        api_key: SecretString,
    ) -> Result<Self, GatewayError> {
        let client = build_client(descriptor.timeout)?;
        let base_url = descriptor.target.base_url();
        Ok(Self {
            descriptor,
            api_key,
            base_url,
            client,
        })
    }

    fn transform_request(&self, request: &BackendRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature.value(),
            max_tokens: request.max_tokens.value(),
        }
    }

    fn transform_response(
        &self,
        request: &BackendRequest,
        response: OpenAIResponse,
    ) -> Result<BackendResponse, GatewayError> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            GatewayError::backend(&self.descriptor.name, "No choices in response", None)
        })?;
        let text = choice.message.content.unwrap_or_default();
        let usage = usage_or_estimate(
            request,
            &text,
            response.usage.as_ref().map(|u| u.prompt_tokens),
            response.usage.as_ref().map(|u| u.completion_tokens),
        );

        Ok(BackendResponse {
            text,
            model: response.model.unwrap_or_else(|| request.model.clone()),
            usage,
        })
    }
}

#[async_trait]
impl Backend for OpenAIBackend {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn complete(&self, request: &BackendRequest) -> Result<BackendResponse, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(
            backend = %self.descriptor.name,
            model = %request.model,
            url = %url,
            "Sending chat completion request"
        );

        let body = self.transform_request(request);
        let response: OpenAIResponse = execute(
            &self.descriptor.name,
            self.client
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&body),
        )
        .await?;

        self.transform_response(request, response)
    }
}

impl std::fmt::Debug for OpenAIBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIBackend")
            .field("name", &self.descriptor.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// OpenAI API Types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: MessageRole,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
