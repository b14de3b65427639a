//! Shared HTTP plumbing for provider clients.

use gateway_core::{BackendRequest, CharTokenEstimator, GatewayError, TokenEstimator, Usage};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{error, trace};

/// Build the HTTP client of one backend
pub(crate) fn build_client(timeout: Duration) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(100)
        .build()
        .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))
}

/// Send a request and decode a successful JSON body.
///
/// Transport failures carry no status, non-2xx answers carry theirs and
/// an undecodable body is reported as a malformed response.
pub(crate) async fn execute<R: DeserializeOwned>(
    backend: &str,
    request: RequestBuilder,
) -> Result<R, GatewayError> {
    let response = request.send().await.map_err(|e| {
        error!(backend = %backend, error = %e, "Backend request failed");
        GatewayError::backend(backend, format!("Request failed: {e}"), None)
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        GatewayError::backend(backend, format!("Failed to read response: {e}"), None)
    })?;

    trace!(backend = %backend, status = %status, body = %body, "Received backend response");

    if !status.is_success() {
        return Err(GatewayError::backend(
            backend,
            error_message(status.as_u16(), &body),
            Some(status.as_u16()),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        GatewayError::backend(backend, format!("Malformed response: {e}"), None)
    })
}

/// Pull a readable message out of a provider error body.
///
/// OpenAI, Anthropic and Google nest it under `error.message`; Ollama
/// sends `error` as a plain string.
fn error_message(status: u16, body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        let error = v.get("error")?;
        error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .or_else(|| error.as_str())
            .map(ToString::to_string)
    });
    message.unwrap_or_else(|| format!("HTTP {status}: {body}"))
}

/// Usage as reported, estimating whichever count the provider left out
pub(crate) fn usage_or_estimate(
    request: &BackendRequest,
    text: &str,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
) -> Usage {
    let estimator = CharTokenEstimator::default();
    let input = input_tokens.unwrap_or_else(|| estimator.estimate_messages(&request.messages));
    let output = output_tokens.unwrap_or_else(|| estimator.estimate_text(text));
    Usage::new(input, output)
}
