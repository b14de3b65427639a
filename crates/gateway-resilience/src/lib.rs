//! # Gateway Resilience
//!
//! Admission control and failover for the AI traffic gateway:
//! - Per-provider token buckets for input and output tokens
//! - Sequential fallback over a route's backend chain
//! - Injectable clock for deterministic refill

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod fallback;
pub mod token_bucket;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::{Attempt, AttemptOutcome, Dispatched, Exhausted, FallbackDispatcher};
pub use token_bucket::{BucketSnapshot, Direction, Permit, Rejection, TokenLimiter};
