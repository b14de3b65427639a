//! Validated domain types (newtypes) for type-safe configuration and requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use thiserror::Error;

/// Validation error for domain types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// Temperature value out of range
    #[error("Invalid temperature {value}: must be between {min} and {max}")]
    InvalidTemperature {
        /// The invalid value provided
        value: f32,
        /// Minimum allowed value
        min: f32,
        /// Maximum allowed value
        max: f32,
    },

    /// Max tokens value out of range
    #[error("Invalid max_tokens {value}: must be between {min} and {max}")]
    InvalidMaxTokens {
        /// The invalid value provided
        value: u32,
        /// Minimum allowed value
        min: u32,
        /// Maximum allowed value
        max: u32,
    },

    /// Unknown provider kind
    #[error("Unknown provider kind: {value}")]
    UnknownProvider {
        /// The unrecognised value
        value: String,
    },
}

/// Kind of model provider a backend talks to.
///
/// The set is closed: every kind has its own wire format and its own
/// required configuration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
    /// OpenAI chat completions API
    OpenAI,
    /// Anthropic messages API
    Anthropic,
    /// Google Gemini generateContent API
    Google,
    /// Self-hosted Ollama server
    Ollama,
}

impl ProviderKind {
    /// All provider kinds, in display order
    pub const ALL: [Self; 4] = [Self::OpenAI, Self::Anthropic, Self::Google, Self::Ollama];

    /// Lowercase identifier used in configuration, metrics and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ValidationError::UnknownProvider {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Temperature for sampling (0.0 to 2.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Temperature(f32);

impl Temperature {
    /// Minimum allowed temperature
    pub const MIN: f32 = 0.0;
    /// Maximum allowed temperature
    pub const MAX: f32 = 2.0;
    /// Default temperature
    pub const DEFAULT: f32 = 0.7;

    /// Create a new temperature value with validation
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidTemperature` if value is outside [0.0, 2.0]
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidTemperature {
                value,
                min: Self::MIN,
                max: Self::MAX,
            })
        }
    }

    /// Get the inner value
    #[must_use]
    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<f32> for Temperature {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(temp: Temperature) -> Self {
        temp.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum tokens to generate (1 to 128,000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MaxTokens(NonZeroU32);

impl MaxTokens {
    /// Minimum allowed max_tokens
    pub const MIN: u32 = 1;
    /// Maximum allowed max_tokens
    pub const MAX: u32 = 128_000;

    /// Create a new max_tokens value with validation
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidMaxTokens` if value is outside [1, 128000]
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        let err = ValidationError::InvalidMaxTokens {
            value,
            min: Self::MIN,
            max: Self::MAX,
        };
        if value > Self::MAX {
            return Err(err);
        }
        NonZeroU32::new(value).map(Self).ok_or(err)
    }

    /// Get the inner value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0.get()
    }

    /// The smaller of this limit and an optional client-requested cap
    #[must_use]
    pub fn capped_by(self, requested: Option<u32>) -> Self {
        match requested.and_then(|r| Self::new(r).ok()) {
            Some(r) if r < self => r,
            _ => self,
        }
    }
}

impl TryFrom<u32> for MaxTokens {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaxTokens> for u32 {
    fn from(tokens: MaxTokens) -> Self {
        tokens.value()
    }
}

impl fmt::Display for MaxTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
