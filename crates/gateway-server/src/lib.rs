//! # Gateway Server
//!
//! HTTP front door for the AI traffic gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server with one or more listeners
//! - The front door: route matching, authentication, token estimation and
//!   fallback dispatch for every non-operational request
//! - JWT authentication against per-route security policies (secret or JWKS)
//! - Health, readiness and Prometheus metrics endpoints
//! - Request id, logging, response time and CORS middleware
//! - Graceful shutdown and hot-swappable routing state

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod front_door;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
mod testing;

// Re-export main types
pub use auth::{AuthError, Authenticator, Principal};
pub use error::ApiError;
pub use front_door::{RejectReason, RequestContext, RequestPhase};
pub use routes::create_router;
pub use server::{Server, ServerError};
pub use state::{AppState, AppStateBuilder, RoutingSnapshot};
