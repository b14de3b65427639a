//! Google Gemini backend.
//!
//! Uses the Google AI Studio API:
//! `POST {base}/v1beta/models/{MODEL}:generateContent?key={API_KEY}`

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

/// Gemini `generateContent` client for one backend
pub struct GoogleBackend {
    descriptor: Arc<BackendDescriptor>,
    api_key: SecretString,
    base_url: String,
    client: Client,
}

impl GoogleBackend {
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

    /// Build the endpoint URL for a model
    fn endpoint_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    /// Transform a backend request to Google's format
    fn transform_request(request: &BackendRequest) -> GoogleRequest {
        // Gemini uses system_instruction for system messages
        let system_instruction = request.system_prompt().map(|text| GoogleContent {
            role: None,
            parts: vec![GooglePart { text }],
        });

        let contents = request
            .conversation()
            .map(|m| GoogleContent {
                role: Some(
                    match m.role {
                        MessageRole::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GooglePart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GoogleRequest {
            contents,
            system_instruction,
            generation_config: GoogleGenerationConfig {
                temperature: request.temperature.value(),
                max_output_tokens: request.max_tokens.value(),
            },
        }
    }

    /// Transform Google response to backend format
    fn transform_response(
        &self,
        request: &BackendRequest,
        response: GoogleResponse,
    ) -> Result<BackendResponse, GatewayError> {
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            GatewayError::backend(&self.descriptor.name, "No candidates in response", None)
        })?;

        let text = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        let usage = usage_or_estimate(
            request,
            &text,
            response.usage_metadata.as_ref().and_then(|u| u.prompt_token_count),
            response.usage_metadata.as_ref().and_then(|u| u.candidates_token_count),
        );

        Ok(BackendResponse {
            text,
            model: response
                .model_version
                .unwrap_or_else(|| request.model.clone()),
            usage,
        })
    }
}

#[async_trait]
impl Backend for GoogleBackend {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn complete(&self, request: &BackendRequest) -> Result<BackendResponse, GatewayError> {
        let url = self.endpoint_url(&request.model);
        debug!(
            backend = %self.descriptor.name,
            model = %request.model,
            url = %url,
            "Sending generateContent request"
        );

        let body = Self::transform_request(request);
        let response: GoogleResponse = execute(
            &self.descriptor.name,
            self.client
                .post(&url)
                .query(&[("key", self.api_key.expose_secret().as_str())])
                .json(&body),
        )
        .await?;

        self.transform_response(request, response)
    }
}

impl std::fmt::Debug for GoogleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleBackend")
            .field("name", &self.descriptor.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// Google API Types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest {
    contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleContent>,
    generation_config: GoogleGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    usage_metadata: Option<GoogleUsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
}
