//! Configuration schema definitions.
//!
//! These types mirror the configuration document one to one. Field-level
//! constraints are declared with `validator`; cross-field rules (provider
//! references, rate ceilings, policy names) are checked when the document is
//! compiled into a [`RuntimeConfig`](crate::RuntimeConfig).

use gateway_core::ProviderKind;
use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listeners
    #[validate(nested)]
    pub listeners: Vec<ListenerConfig>,

    /// Provider credentials and token rate policies
    pub providers: BTreeMap<ProviderKind, ProviderConfig>,

    /// Routes, in declaration order
    #[validate(nested)]
    pub routes: Vec<RouteConfig>,

    /// Security configuration
    pub security: SecurityConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Validate field-level constraints
    ///
    /// # Errors
    /// Returns validation errors if configuration is invalid
    pub fn validate_config(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListenerConfig {
    /// Listener name (used in logs)
    #[serde(default = "default_listener_name")]
    #[validate(length(min = 1))]
    pub name: String,

    /// Bind host
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Bind port
    #[validate(range(min = 1))]
    pub port: u16,
}

fn default_listener_name() -> String {
    "default".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl ListenerConfig {
    /// Create a listener on the default host
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: default_host(),
            port,
        }
    }

    /// Get the socket address
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// API key (usually `${ENV_VAR}`); required for cloud providers
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Base URL override for every backend of this provider
    #[serde(default)]
    pub base_url: Option<Url>,

    /// Token rate policy
    pub rate_limit: RateLimitConfig,
}

/// Token rate policy of a provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Input tokens admitted per second
    pub input_tokens_per_second: f64,

    /// Output tokens admitted per second
    pub output_tokens_per_second: f64,
}

/// Route configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RouteConfig {
    /// Unique route name
    #[validate(length(min = 1))]
    pub name: String,

    /// Path patterns
    #[serde(default)]
    pub paths: Vec<String>,

    /// Security policy name; the route is public without one
    #[serde(default)]
    pub security: Option<String>,

    /// Models a client may pick with `model` for the route's Ollama backends
    #[serde(default)]
    pub allowed_models: Vec<String>,

    /// Fallback chain
    #[serde(default)]
    #[validate(nested)]
    pub backends: Vec<BackendConfig>,
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackendConfig {
    /// Unique backend name
    #[validate(length(min = 1))]
    pub name: String,

    /// Provider kind
    pub provider: ProviderKind,

    /// Model identifier
    #[validate(length(min = 1))]
    pub model: String,

    /// Endpoint; required for self-hosted providers, overrides the
    /// provider base URL otherwise
    #[serde(default)]
    pub endpoint: Option<Url>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Fallback priority (lower is tried first)
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Per-call timeout
    #[serde(default = "default_backend_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_priority() -> u32 {
    1
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Security configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Named JWT policies routes can refer to
    pub policies: BTreeMap<String, SecurityPolicyConfig>,

    /// CORS configuration
    pub cors: CorsConfig,
}

/// JWT validation policy
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPolicyConfig {
    /// Expected `iss` claim
    #[serde(default)]
    pub issuer: Option<String>,

    /// Accepted `aud` values
    #[serde(default)]
    pub audiences: Vec<String>,

    /// Remote JWKS document
    #[serde(default)]
    pub jwks_uri: Option<Url>,

    /// Shared HMAC secret (development)
    #[serde(default)]
    pub secret: Option<SecretString>,

    /// Timeout for fetching the JWKS document
    #[serde(default = "default_jwks_fetch_timeout", with = "humantime_serde")]
    pub jwks_fetch_timeout: Duration,

    /// How long a fetched JWKS document is trusted
    #[serde(default = "default_jwks_cache_duration", with = "humantime_serde")]
    pub jwks_cache_duration: Duration,

    /// Accepted signing algorithms; defaults by key source
    #[serde(default)]
    pub algorithms: Vec<Algorithm>,

    /// Clock skew tolerance for `exp`/`nbf`
    #[serde(default = "default_leeway", with = "humantime_serde")]
    pub leeway: Duration,
}

fn default_jwks_fetch_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_jwks_cache_duration() -> Duration {
    Duration::from_secs(300)
}

fn default_leeway() -> Duration {
    Duration::from_secs(60)
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Whether CORS headers are emitted
    pub enabled: bool,

    /// Allowed origins; `*` allows any
    pub allow_origins: Vec<String>,

    /// Max age for preflight cache
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origins: vec!["*".to_string()],
            max_age: Duration::from_secs(3600),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    #[validate(nested)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[validate(nested)]
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[validate(length(min = 1))]
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs
    #[default]
    Json,
    /// Human-readable pretty logs
    Pretty,
    /// Compact single-line logs
    Compact,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is served
    pub enabled: bool,

    /// Metrics endpoint path
    #[validate(length(min = 1))]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}
