//! Backend descriptors and the trait implemented by provider clients.
//!
//! A backend is one concrete (provider, model, parameters) combination that
//! a route can fall back through. Descriptors are built once when the
//! configuration is loaded and are immutable afterwards.

use crate::error::GatewayError;
use crate::request::BackendRequest;
use crate::response::BackendResponse;
use crate::types::{MaxTokens, ProviderKind, Temperature};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Network target of a backend, tagged by provider kind.
///
/// Each variant carries exactly the fields its provider needs, so a
/// self-hosted backend cannot exist without an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// OpenAI, optionally through a compatible base URL
    OpenAI {
        /// Base URL override
        base_url: Option<Url>,
    },
    /// Anthropic
    Anthropic {
        /// Base URL override
        base_url: Option<Url>,
    },
    /// Google Gemini
    Google {
        /// Base URL override
        base_url: Option<Url>,
    },
    /// Ollama server
    Ollama {
        /// Server endpoint
        endpoint: Url,
    },
}

impl BackendTarget {
    /// Provider kind of this target
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenAI { .. } => ProviderKind::OpenAI,
            Self::Anthropic { .. } => ProviderKind::Anthropic,
            Self::Google { .. } => ProviderKind::Google,
            Self::Ollama { .. } => ProviderKind::Ollama,
        }
    }

    /// Base URL the client should talk to
    #[must_use]
    pub fn base_url(&self) -> String {
        let url = match self {
            Self::OpenAI { base_url } => base_url
                .as_ref()
                .map_or("https://api.openai.com", Url::as_str),
            Self::Anthropic { base_url } => base_url
                .as_ref()
                .map_or("https://api.anthropic.com", Url::as_str),
            Self::Google { base_url } => base_url
                .as_ref()
                .map_or("https://generativelanguage.googleapis.com", Url::as_str),
            Self::Ollama { endpoint } => endpoint.as_str(),
        };
        url.trim_end_matches('/').to_string()
    }
}

/// Generation parameters applied to every call of a backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Sampling temperature
    pub temperature: Temperature,
    /// Maximum output tokens; also the output budget reserved per call
    pub max_output_tokens: MaxTokens,
}

/// Immutable description of one backend in a fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    /// Unique backend name
    pub name: String,
    /// Provider target
    pub target: BackendTarget,
    /// Model identifier sent to the provider
    pub model: String,
    /// Generation parameters
    pub params: GenerationParams,
    /// Fallback priority (lower is tried first)
    pub priority: u32,
    /// Upper bound for a single call
    pub timeout: Duration,
}

impl BackendDescriptor {
    /// Default per-call timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a descriptor with default priority (1) and timeout
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: BackendTarget,
        model: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            model: model.into(),
            params,
            priority: 1,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Provider kind of this backend
    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.target.kind()
    }
}

/// Per-provider token rate policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenLimitPolicy {
    /// Input (prompt) tokens admitted per second
    pub input_tokens_per_second: f64,
    /// Output (completion) tokens admitted per second
    pub output_tokens_per_second: f64,
}

impl TokenLimitPolicy {
    /// Create a policy from per-second rates
    #[must_use]
    pub fn new(input_tokens_per_second: f64, output_tokens_per_second: f64) -> Self {
        Self {
            input_tokens_per_second,
            output_tokens_per_second,
        }
    }

    /// Both rates are finite and strictly positive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.input_tokens_per_second, self.output_tokens_per_second]
            .iter()
            .all(|r| r.is_finite() && *r > 0.0)
    }
}

/// A client able to run a completion against one backend
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Backend name (matches its descriptor)
    fn name(&self) -> &str;

    /// Provider kind
    fn kind(&self) -> ProviderKind;

    /// Execute a non-streaming completion
    ///
    /// # Errors
    /// Returns `GatewayError::Backend` on transport failures, non-2xx
    /// statuses or undecodable provider responses
    async fn complete(&self, request: &BackendRequest) -> Result<BackendResponse, GatewayError>;
}

/// Resolves backend clients by name
pub trait BackendLookup: Send + Sync {
    /// Client registered for the given backend name
    fn backend(&self, name: &str) -> Option<Arc<dyn Backend>>;
}
