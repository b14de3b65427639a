//! # Gateway Core
//!
//! Core types, traits, and error handling for the AI traffic gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Provider kinds and backend descriptors (the immutable backend registry entries)
//! - Client request and response bodies
//! - The `Backend` trait every model provider client implements
//! - Input token estimation
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod request;
pub mod response;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use backend::{
    Backend, BackendDescriptor, BackendLookup, BackendTarget, GenerationParams, TokenLimitPolicy,
};
pub use error::{ApiErrorResponse, GatewayError};
pub use request::{BackendRequest, ChatMessage, InferenceRequest, MessageRole};
pub use response::{BackendResponse, GatewayResponse, Usage};
pub use tokens::{CharTokenEstimator, TokenEstimator};
pub use types::{MaxTokens, ProviderKind, Temperature, ValidationError};
