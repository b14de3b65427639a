//! # Gateway Telemetry
//!
//! Observability for the AI traffic gateway.
//!
//! This crate provides:
//! - Structured logging initialization (json, pretty or compact)
//! - Prometheus metrics for monitoring
//! - Per-request audit records

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod logging;
pub mod metrics;

// Re-export main types
pub use audit::{AttemptRecord, RequestAuditRecord, AUDIT_TARGET};
pub use logging::{build_filter, init_logging, LoggingError};
pub use metrics::{Metrics, RequestMetrics};
