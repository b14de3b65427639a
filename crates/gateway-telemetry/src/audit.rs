//! Per-request audit records.
//!
//! Every request that reaches the front door produces exactly one record,
//! emitted as a JSON line on the `audit` tracing target so it can be
//! filtered or shipped separately from operational logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Tracing target audit records are written to
pub const AUDIT_TARGET: &str = "audit";

/// One backend attempt as recorded in the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Backend name
    pub backend: String,
    /// Provider kind
    pub provider: String,
    /// Model
    pub model: String,
    /// Outcome label
    pub outcome: String,
    /// Failure detail, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Time spent on the attempt
    pub elapsed_ms: u64,
}

/// Audit record of one front-door request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAuditRecord {
    /// Request identifier
    pub request_id: String,
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Matched route
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Last phase the request reached
    pub phase: String,
    /// Final outcome label
    pub outcome: String,
    /// HTTP status returned
    pub status: u16,
    /// Backend attempts, in order
    pub attempts: Vec<AttemptRecord>,
    /// Estimated input tokens
    pub input_tokens: u32,
    /// Output tokens reported by the serving backend
    pub output_tokens: u32,
    /// End-to-end latency
    pub latency_ms: u64,
    /// When the request completed
    pub timestamp: DateTime<Utc>,
}

impl RequestAuditRecord {
    /// Write the record to the audit target
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!(
                target: AUDIT_TARGET,
                request_id = %self.request_id,
                outcome = %self.outcome,
                "{json}"
            ),
            Err(e) => error!(
                target: AUDIT_TARGET,
                request_id = %self.request_id,
                error = %e,
                "Failed to serialize audit record"
            ),
        }
    }
}
