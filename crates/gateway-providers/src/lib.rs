//! # Gateway Providers
//!
//! Model provider backends for the AI traffic gateway.
//!
//! This crate provides one [`Backend`](gateway_core::Backend) client per
//! provider kind:
//! - OpenAI (chat completions)
//! - Anthropic (messages)
//! - Google AI (Gemini `generateContent`)
//! - Ollama (self-hosted)
//!
//! and the [`BackendRegistry`] that maps backend names to clients.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod http;

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
pub mod registry;

#[cfg(test)]
mod testing;

// Re-export main types
pub use anthropic::AnthropicBackend;
pub use google::GoogleBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAIBackend;
pub use registry::{create_backend, BackendRegistry};
