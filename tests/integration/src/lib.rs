//! Integration tests for the AI gateway
//!
//! This crate runs the gateway on loopback ports against mock providers:
//! - Route matching, authentication and request validation
//! - Fallback across providers on errors, rate limits and timeouts
//! - Token budget exhaustion
//! - Configuration reload while serving

pub mod helpers;
pub mod mock_providers;

// Re-export commonly used items
pub use helpers::*;
pub use mock_providers::*;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod reload_tests;
