//! Anthropic backend.
//!
//! Uses the Messages API. System turns are lifted out of the conversation
//! into the top-level `system` field, as the API requires.

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

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic messages client for one backend
pub struct AnthropicBackend {
    descriptor: Arc<BackendDescriptor>,
    api_key: SecretString,
    base_url: String,
    client: Client,
}

impl AnthropicBackend {
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

    fn transform_request(request: &BackendRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: request.model.clone(),
            system: request.system_prompt(),
            messages: request
                .conversation()
                .map(|m| AnthropicMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature.value(),
            max_tokens: request.max_tokens.value(),
        }
    }

    fn transform_response(
        request: &BackendRequest,
        response: AnthropicResponse,
    ) -> BackendResponse {
        let text = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<String>();
        let usage = usage_or_estimate(
            request,
            &text,
            response.usage.map(|u| u.input_tokens),
            response.usage.map(|u| u.output_tokens),
        );

        BackendResponse {
            text,
            model: response.model.unwrap_or_else(|| request.model.clone()),
            usage,
        }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn complete(&self, request: &BackendRequest) -> Result<BackendResponse, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(
            backend = %self.descriptor.name,
            model = %request.model,
            "Sending messages request"
        );

        let body = Self::transform_request(request);
        let response: AnthropicResponse = execute(
            &self.descriptor.name,
            self.client
                .post(&url)
                .header("x-api-key", self.api_key.expose_secret().as_str())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        Ok(Self::transform_response(request, response))
    }
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("name", &self.descriptor.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// Anthropic API Types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: MessageRole,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
