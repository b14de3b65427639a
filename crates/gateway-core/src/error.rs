//! Error types and handling for the gateway.
//!
//! Every failure a client can observe is a `GatewayError`. Each variant maps
//! to one HTTP status code and serializes into an OpenAI-style error body.
//! Attempt-level failures inside a fallback chain are also expressed as
//! `GatewayError`s, but only the terminal error reaches the client.

use crate::types::ValidationError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Gateway error type covering every client-visible failure
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Field that failed validation (if applicable)
        field: Option<String>,
        /// Error code for programmatic handling
        code: String,
    },

    /// Authentication failed
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message
        message: String,
    },

    /// No route matched the request path
    #[error("No route matches path {path}")]
    RouteNotFound {
        /// Request path
        path: String,
    },

    /// Method not accepted on a routed path
    #[error("Method {method} not allowed")]
    MethodNotAllowed {
        /// Request method
        method: String,
    },

    /// Provider token budget exhausted
    #[error("Rate limit exceeded for provider {provider}")]
    RateLimit {
        /// Provider whose bucket rejected the request
        provider: String,
        /// Suggested wait before retrying, when the request can ever fit
        retry_after: Option<Duration>,
    },

    /// Backend call failed
    #[error("Backend error: {backend} - {message}")]
    Backend {
        /// Backend that failed
        backend: String,
        /// Error message
        message: String,
        /// HTTP status code from the provider (if any)
        status_code: Option<u16>,
    },

    /// Backend call timed out
    #[error("Backend {backend} timed out after {duration:?}")]
    Timeout {
        /// Backend that timed out
        backend: String,
        /// Timeout that elapsed
        duration: Duration,
    },

    /// Every backend of a route was tried and none succeeded
    #[error("All {attempts} backend(s) of route {route} failed")]
    Exhausted {
        /// Route name
        route: String,
        /// Number of attempts made
        attempts: usize,
        /// Retry hint when every attempt was rate limited
        retry_after: Option<Duration>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Internal server error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimit { .. } | Self::Exhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Backend { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error type string for API responses
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::MethodNotAllowed { .. } => "invalid_request_error",
            Self::Authentication { .. } => "authentication_error",
            Self::RouteNotFound { .. } => "not_found_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::Backend { .. } => "backend_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Exhausted { .. } => "service_unavailable_error",
            Self::Configuration { .. } | Self::Internal { .. } => "internal_error",
        }
    }

    /// Get the error code for programmatic handling
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::Validation { code, .. } => code,
            Self::Authentication { .. } => "authentication_failed",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::RateLimit { .. } => "rate_limit_exceeded",
            Self::Backend { .. } => "backend_error",
            Self::Timeout { .. } => "timeout",
            Self::Exhausted { .. } => "backends_exhausted",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Suggested client wait, if any
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } | Self::Exhausted { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create an authentication error
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a route-not-found error
    #[must_use]
    pub fn route_not_found(path: impl Into<String>) -> Self {
        Self::RouteNotFound { path: path.into() }
    }

    /// Create a method-not-allowed error
    #[must_use]
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }

    /// Create a backend error
    #[must_use]
    pub fn backend(
        backend: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(backend: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            backend: backend.into(),
            duration,
        }
    }

    /// Create an exhausted-chain error
    #[must_use]
    pub fn exhausted(
        route: impl Into<String>,
        attempts: usize,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::Exhausted {
            route: route.into(),
            attempts,
            retry_after,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        let (field, code) = match &err {
            ValidationError::InvalidTemperature { .. } => ("temperature", "invalid_temperature"),
            ValidationError::InvalidMaxTokens { .. } => ("max_tokens", "invalid_max_tokens"),
            ValidationError::UnknownProvider { .. } => ("provider", "unknown_provider"),
        };
        Self::Validation {
            message: err.to_string(),
            field: Some(field.to_string()),
            code: code.to_string(),
        }
    }
}

/// API error response format (OpenAI compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details
    pub error: ApiError,
}

/// API error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Parameter that caused the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Seconds to wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&GatewayError> for ApiErrorResponse {
    fn from(err: &GatewayError) -> Self {
        let param = match err {
            GatewayError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        Self {
            error: ApiError {
                error_type: err.error_type().to_string(),
                message: err.to_string(),
                code: Some(err.error_code().to_string()),
                param,
                retry_after: err.retry_after().map(retry_after_secs),
            },
        }
    }
}

impl fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error.message)
    }
}

/// Whole seconds for a `Retry-After` value, rounded up and at least 1
#[must_use]
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
