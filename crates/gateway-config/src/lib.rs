//! # Gateway Config
//!
//! Configuration management for the AI gateway.
//!
//! This crate provides:
//! - The configuration document schema (listeners, providers, routes, security)
//! - Loading from YAML, TOML or JSON with environment variable substitution
//! - Compilation into an immutable [`RuntimeConfig`] with cross-field checks
//! - Hot reload with atomic swaps of the compiled configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod hot_reload;
pub mod loader;
pub mod runtime;
pub mod schema;

// Re-export main types
pub use hot_reload::ConfigWatcher;
pub use loader::{
    apply_env_overrides, load_config, locate_config, substitute_env_vars, ConfigError,
    ConfigLoader, ConfigSource, DEFAULT_PATHS, ENV_PREFIX,
};
pub use runtime::{KeySource, ProviderCredentials, RuntimeConfig, SecurityPolicy};
pub use schema::{
    BackendConfig, CorsConfig, GatewayConfig, ListenerConfig, LogFormat, LoggingConfig,
    MetricsConfig, ObservabilityConfig, ProviderConfig, RateLimitConfig, RouteConfig,
    SecurityConfig, SecurityPolicyConfig,
};
