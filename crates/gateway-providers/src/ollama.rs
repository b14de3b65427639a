//! Ollama backend for self-hosted models.
//!
//! Calls `POST {endpoint}/api/chat` with streaming disabled. No credentials
//! are sent.

use crate::http::{build_client, execute, usage_or_estimate};
use async_trait::async_trait;
use gateway_core::{
    Backend, BackendDescriptor, BackendRequest, BackendResponse, GatewayError, MessageRole,
    ProviderKind,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Ollama chat client for one backend
pub struct OllamaBackend {
    descriptor: Arc<BackendDescriptor>,
    endpoint: String,
    client: Client,
}

impl OllamaBackend {
    /// Create the client of `descriptor`
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(descriptor: Arc<BackendDescriptor>) -> Result<Self, GatewayError> {
        let client = build_client(descriptor.timeout)?;
        let endpoint = descriptor.target.base_url();
        Ok(Self {
            descriptor,
            endpoint,
            client,
        })
    }

    fn transform_request(request: &BackendRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature.value(),
                num_predict: request.max_tokens.value(),
            },
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn complete(&self, request: &BackendRequest) -> Result<BackendResponse, GatewayError> {
        let url = format!("{}/api/chat", self.endpoint);
        debug!(
            backend = %self.descriptor.name,
            model = %request.model,
            url = %url,
            "Sending chat request"
        );

        let body = Self::transform_request(request);
        let response: OllamaResponse =
            execute(&self.descriptor.name, self.client.post(&url).json(&body)).await?;

        let text = response.message.map(|m| m.content).unwrap_or_default();
        let usage = usage_or_estimate(
            request,
            &text,
            response.prompt_eval_count,
            response.eval_count,
        );

        Ok(BackendResponse {
            text,
            model: response.model.unwrap_or_else(|| request.model.clone()),
            usage,
        })
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("name", &self.descriptor.name)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

// Ollama API Types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: MessageRole,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}
