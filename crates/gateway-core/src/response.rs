//! Response types for the gateway.

use crate::types::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token usage of a completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl Usage {
    /// Create a usage record; the total is derived
    #[must_use]
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// What a backend returned for one completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    /// Generated text
    pub text: String,
    /// Model that actually served the request, as reported by the provider
    pub model: String,
    /// Token usage
    pub usage: Usage,
}

/// Client response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Request identifier (also sent as `x-request-id`)
    pub id: String,
    /// Generated text
    pub response: String,
    /// Matched route
    pub route: String,
    /// Backend that served the request
    pub backend: String,
    /// Provider of that backend
    pub provider: ProviderKind,
    /// Model that served the request
    pub model: String,
    /// True when the serving backend was not first in the chain
    pub used_fallback: bool,
    /// Model of the first-priority backend, present when fallback was used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_model: Option<String>,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Token usage
    pub usage: Usage,
}
