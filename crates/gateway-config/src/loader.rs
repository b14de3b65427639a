//! Configuration loading from files and environment.
//!
//! Files are read as YAML, TOML or JSON depending on their extension.
//! `${VAR}` and `${VAR:-default}` references are substituted before parsing,
//! and a handful of `AI_GATEWAY_*` variables override the parsed document.

use crate::schema::{GatewayConfig, ListenerConfig, LogFormat};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "AI_GATEWAY";

/// Default search locations, in order
pub const DEFAULT_PATHS: [&str; 4] = [
    "config.yaml",
    "config.yml",
    "config/gateway.yaml",
    "/etc/ai-gateway/config.yaml",
];

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// The path to the file that was not found
        path: String,
    },

    /// No file at any default location
    #[error("No configuration file found (searched: {searched})")]
    NotLocated {
        /// Locations searched
        searched: String,
    },

    /// IO error
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Unsupported format
    #[error("Unsupported configuration format: {extension}")]
    UnsupportedFormat {
        /// The file extension that was not supported
        extension: String,
    },

    /// File watching failed
    #[error("Configuration watch error: {0}")]
    Watch(String),
}

/// Configuration source
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path
    File(PathBuf),
    /// Raw YAML string
    Yaml(String),
    /// Raw TOML string
    Toml(String),
    /// Raw JSON string
    Json(String),
}

/// Configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    source: ConfigSource,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Load from a source
    #[must_use]
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            env_prefix: None,
        }
    }

    /// Load from a file
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(ConfigSource::File(path.into()))
    }

    /// Set environment variable prefix for overrides
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Load and parse the configuration
    ///
    /// Only parsing happens here; semantic validation is done by
    /// [`RuntimeConfig::compile`](crate::RuntimeConfig::compile).
    ///
    /// # Errors
    /// Returns error if the source cannot be read or parsed
    pub async fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.source {
            ConfigSource::File(path) => Self::load_file(path).await?,
            ConfigSource::Yaml(content) => Self::parse_yaml(&substitute_env_vars(content))?,
            ConfigSource::Toml(content) => Self::parse_toml(&substitute_env_vars(content))?,
            ConfigSource::Json(content) => Self::parse_json(&substitute_env_vars(content))?,
        };

        if let Some(prefix) = &self.env_prefix {
            apply_env_overrides(&mut config, prefix);
        }

        Ok(config)
    }

    async fn load_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let content = substitute_env_vars(&content);

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        debug!(path = %path.display(), format = %extension, "Loading configuration");

        match extension.as_str() {
            "yaml" | "yml" => Self::parse_yaml(&content),
            "toml" => Self::parse_toml(&content),
            "json" => Self::parse_json(&content),
            ext => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    fn parse_yaml(content: &str) -> Result<GatewayConfig, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn parse_toml(content: &str) -> Result<GatewayConfig, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn parse_json(content: &str) -> Result<GatewayConfig, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}

#[allow(clippy::expect_used)]
static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

/// Substitute `${VAR}` and `${VAR:-default}` references.
///
/// An unset variable without default becomes an empty string, so a missing
/// credential surfaces as a validation error rather than a literal
/// placeholder.
#[must_use]
pub fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |cap: &Captures<'_>| {
            let reference = &cap[1];
            let (name, default) = match reference.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (reference, None),
            };
            match (std::env::var(name), default) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => {
                    warn!(variable = %name, "Environment variable not set");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Apply `{prefix}_*` environment overrides
pub fn apply_env_overrides(config: &mut GatewayConfig, prefix: &str) {
    if let Ok(level) = std::env::var(format!("{prefix}_LOG_LEVEL")) {
        config.observability.logging.level = level;
    }

    if let Ok(format) = std::env::var(format!("{prefix}_LOG_FORMAT")) {
        match format.to_lowercase().as_str() {
            "json" => config.observability.logging.format = LogFormat::Json,
            "pretty" => config.observability.logging.format = LogFormat::Pretty,
            "compact" => config.observability.logging.format = LogFormat::Compact,
            other => warn!(format = %other, "Ignoring unknown log format override"),
        }
    }

    if let Ok(enabled) = std::env::var(format!("{prefix}_METRICS_ENABLED")) {
        match enabled.parse() {
            Ok(enabled) => config.observability.metrics.enabled = enabled,
            Err(_) => warn!(value = %enabled, "Ignoring invalid metrics override"),
        }
    }

    if let Ok(port) = std::env::var(format!("{prefix}_PORT")) {
        match port.parse() {
            Ok(port) => match config.listeners.first_mut() {
                Some(listener) => listener.port = port,
                None => config.listeners.push(ListenerConfig::new("default", port)),
            },
            Err(_) => warn!(port = %port, "Ignoring invalid port override"),
        }
    }
}

/// Find the configuration file.
///
/// Looks in order at:
/// 1. Path from the `CONFIG_PATH` environment variable
/// 2. ./config.yaml, ./config.yml
/// 3. ./config/gateway.yaml
/// 4. /etc/ai-gateway/config.yaml
///
/// # Errors
/// Returns error if `CONFIG_PATH` points nowhere or no default exists
pub fn locate_config() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        let path = PathBuf::from(path);
        return if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            })
        };
    }

    DEFAULT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| ConfigError::NotLocated {
            searched: DEFAULT_PATHS.join(", "),
        })
}

/// Locate and load the configuration with environment overrides
///
/// # Errors
/// Returns error if no configuration is found or parsing fails
pub async fn load_config() -> Result<(PathBuf, GatewayConfig), ConfigError> {
    let path = locate_config()?;
    info!(path = %path.display(), "Loading configuration");
    let config = ConfigLoader::file(&path)
        .with_env_prefix(ENV_PREFIX)
        .load()
        .await?;
    Ok((path, config))
}
