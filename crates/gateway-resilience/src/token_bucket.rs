//! Per-provider token bucket admission control.
//!
//! Every provider owns two buckets, one for input (prompt) tokens and one
//! for output (completion) tokens. A bucket holds at most one second of its
//! configured rate, refills continuously, and starts full.
//!
//! A request reserves its estimated input tokens and its maximum output
//! tokens in a single critical section: either both are debited or neither
//! is. The returned [`Permit`] is settled once the backend has answered:
//! - [`TokenLimiter::record`] reconciles the output reservation with the
//!   tokens actually produced;
//! - [`Permit::forfeit`] keeps the whole reservation spent (failed call);
//! - dropping the permit unsettled returns the output reservation
//!   (the request was cancelled before the backend could produce anything
//!   that counts).
//!
//! Providers never share a lock. The provider table itself is swapped
//! atomically on configuration reload and read without locking.

use crate::clock::{Clock, SystemClock};
use arc_swap::ArcSwap;
use gateway_core::{ProviderKind, TokenLimitPolicy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Token direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Prompt tokens
    Input,
    /// Completion tokens
    Output,
}

impl Direction {
    /// Label used in logs and metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reservation was refused
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Rejection {
    /// Not enough budget in one of the buckets
    #[error("{provider} {direction} budget insufficient: requested {requested}, available {available}")]
    Insufficient {
        /// Provider
        provider: ProviderKind,
        /// Bucket that lacked budget
        direction: Direction,
        /// Tokens requested from that bucket
        requested: u32,
        /// Whole tokens available at decision time
        available: u32,
        /// Time until the request would fit; `None` if it never can
        retry_after: Option<Duration>,
    },

    /// No policy is configured for the provider
    #[error("No token limit policy for provider {provider}")]
    UnknownProvider {
        /// Provider
        provider: ProviderKind,
    },
}

impl Rejection {
    /// Suggested wait before the same request could be admitted
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Insufficient { retry_after, .. } => *retry_after,
            Self::UnknownProvider { .. } => None,
        }
    }

    /// Bucket that refused the request
    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::Insufficient { direction, .. } => Some(*direction),
            Self::UnknownProvider { .. } => None,
        }
    }

    /// Whether the request is larger than the bucket can ever hold
    #[must_use]
    pub fn exceeds_capacity(&self) -> bool {
        matches!(
            self,
            Self::Insufficient {
                retry_after: None,
                ..
            }
        )
    }
}

/// Point-in-time view of a provider's buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// Input tokens available
    pub input_available: f64,
    /// Input bucket capacity (tokens per second)
    pub input_capacity: f64,
    /// Output tokens available
    pub output_available: f64,
    /// Output bucket capacity (tokens per second)
    pub output_capacity: f64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    capacity: f64,
    available: f64,
}

impl Bucket {
    fn full(capacity: f64) -> Self {
        Self {
            capacity,
            available: capacity,
        }
    }

    fn refill(&mut self, elapsed_secs: f64) {
        // Capacity equals the per-second rate
        self.available = (self.available + elapsed_secs * self.capacity).min(self.capacity);
    }

    fn credit(&mut self, tokens: f64) {
        self.available = (self.available + tokens).min(self.capacity);
    }

    fn debit(&mut self, tokens: f64) {
        self.available = (self.available - tokens).max(0.0);
    }

    fn wait_for(&self, tokens: f64) -> Option<Duration> {
        if tokens > self.capacity {
            return None;
        }
        let deficit = (tokens - self.available).max(0.0);
        Some(Duration::from_secs_f64(deficit / self.capacity))
    }

    fn resize(&mut self, capacity: f64) {
        self.capacity = capacity;
        self.available = self.available.min(capacity);
    }
}

#[derive(Debug)]
struct BucketState {
    input: Bucket,
    output: Bucket,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.input.refill(elapsed);
            self.output.refill(elapsed);
            self.last_refill = now;
        }
    }
}

/// Input and output buckets of one provider
#[derive(Debug)]
pub struct ProviderBucket {
    provider: ProviderKind,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl ProviderBucket {
    fn new(provider: ProviderKind, policy: TokenLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            provider,
            clock,
            state: Mutex::new(BucketState {
                input: Bucket::full(policy.input_tokens_per_second),
                output: Bucket::full(policy.output_tokens_per_second),
                last_refill: now,
            }),
        }
    }

    fn try_reserve(&self, input: u32, output: u32) -> Result<(), Rejection> {
        let mut state = self.state.lock();
        state.refill(self.clock.now());

        let wanted = [
            (Direction::Input, state.input, f64::from(input), input),
            (Direction::Output, state.output, f64::from(output), output),
        ];

        let mut worst: Option<Rejection> = None;
        for (direction, bucket, tokens, requested) in wanted {
            if bucket.available >= tokens {
                continue;
            }
            let retry_after = bucket.wait_for(tokens);
            let rejection = Rejection::Insufficient {
                provider: self.provider,
                direction,
                requested,
                available: bucket.available.floor() as u32,
                retry_after,
            };
            // Keep the rejection with the longest (or infinite) wait
            let replace = match (&worst, retry_after) {
                (None, _) => true,
                (Some(current), Some(wait)) => current
                    .retry_after()
                    .is_some_and(|current_wait| wait > current_wait),
                (Some(current), None) => !current.exceeds_capacity(),
            };
            if replace {
                worst = Some(rejection);
            }
        }

        if let Some(rejection) = worst {
            return Err(rejection);
        }

        state.input.available -= f64::from(input);
        state.output.available -= f64::from(output);
        Ok(())
    }

    fn reconcile(&self, reserved: u32, actual: u32) {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        if actual <= reserved {
            state.output.credit(f64::from(reserved - actual));
        } else {
            state.output.debit(f64::from(actual - reserved));
        }
    }

    fn snapshot(&self) -> BucketSnapshot {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        BucketSnapshot {
            input_available: state.input.available,
            input_capacity: state.input.capacity,
            output_available: state.output.available,
            output_capacity: state.output.capacity,
        }
    }

    fn apply(&self, policy: TokenLimitPolicy) {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        state.input.resize(policy.input_tokens_per_second);
        state.output.resize(policy.output_tokens_per_second);
    }
}

/// Reservation against a provider's buckets.
///
/// Must be settled through [`TokenLimiter::record`] or [`Permit::forfeit`];
/// dropping it unsettled returns the reserved output tokens.
#[must_use = "an unsettled permit releases its output reservation on drop"]
pub struct Permit {
    bucket: Arc<ProviderBucket>,
    input_tokens: u32,
    output_tokens: u32,
    settled: bool,
}

impl Permit {
    /// Provider the reservation was made against
    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.bucket.provider
    }

    /// Reserved input tokens
    #[must_use]
    pub fn input_tokens(&self) -> u32 {
        self.input_tokens
    }

    /// Reserved output tokens
    #[must_use]
    pub fn output_tokens(&self) -> u32 {
        self.output_tokens
    }

    /// Give up the reservation without refund
    pub fn forfeit(mut self) {
        self.settled = true;
        debug!(
            provider = %self.bucket.provider,
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            "Permit forfeited"
        );
    }

    fn settle(mut self, actual_output_tokens: u32) {
        self.settled = true;
        self.bucket
            .reconcile(self.output_tokens, actual_output_tokens);
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("provider", &self.bucket.provider)
            .field("input_tokens", &self.input_tokens)
            .field("output_tokens", &self.output_tokens)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.settled {
            self.bucket.reconcile(self.output_tokens, 0);
            debug!(
                provider = %self.bucket.provider,
                output_tokens = self.output_tokens,
                "Unsettled permit dropped, output reservation released"
            );
        }
    }
}

/// Token bucket limiter keyed by provider
pub struct TokenLimiter {
    buckets: ArcSwap<HashMap<ProviderKind, Arc<ProviderBucket>>>,
    clock: Arc<dyn Clock>,
}

impl TokenLimiter {
    /// Create a limiter on the system clock
    #[must_use]
    pub fn new(policies: &HashMap<ProviderKind, TokenLimitPolicy>) -> Self {
        Self::with_clock(policies, Arc::new(SystemClock))
    }

    /// Create a limiter on a given clock
    #[must_use]
    pub fn with_clock(
        policies: &HashMap<ProviderKind, TokenLimitPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let buckets = policies
            .iter()
            .map(|(provider, policy)| {
                (
                    *provider,
                    Arc::new(ProviderBucket::new(*provider, *policy, Arc::clone(&clock))),
                )
            })
            .collect();
        Self {
            buckets: ArcSwap::from_pointee(buckets),
            clock,
        }
    }

    /// Reserve input and maximum output tokens for one backend call
    ///
    /// # Errors
    /// Returns a [`Rejection`] when either bucket lacks budget; nothing is
    /// debited in that case
    pub fn reserve(
        &self,
        provider: ProviderKind,
        input_tokens: u32,
        max_output_tokens: u32,
    ) -> Result<Permit, Rejection> {
        let bucket = self
            .buckets
            .load()
            .get(&provider)
            .cloned()
            .ok_or(Rejection::UnknownProvider { provider })?;

        bucket.try_reserve(input_tokens, max_output_tokens)?;

        Ok(Permit {
            bucket,
            input_tokens,
            output_tokens: max_output_tokens,
            settled: false,
        })
    }

    /// Settle a permit with the output tokens actually produced
    pub fn record(&self, permit: Permit, actual_output_tokens: u32) {
        permit.settle(actual_output_tokens);
    }

    /// Current balances of a provider
    #[must_use]
    pub fn snapshot(&self, provider: ProviderKind) -> Option<BucketSnapshot> {
        self.buckets.load().get(&provider).map(|b| b.snapshot())
    }

    /// Providers with a configured policy
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut providers: Vec<_> = self.buckets.load().keys().copied().collect();
        providers.sort();
        providers
    }

    /// Replace the policy set, keeping balances of surviving providers
    /// (clamped to their new capacity)
    pub fn apply_policies(&self, policies: &HashMap<ProviderKind, TokenLimitPolicy>) {
        let current = self.buckets.load();
        let next: HashMap<_, _> = policies
            .iter()
            .map(|(provider, policy)| {
                let bucket = match current.get(provider) {
                    Some(existing) => {
                        existing.apply(*policy);
                        Arc::clone(existing)
                    }
                    None => Arc::new(ProviderBucket::new(
                        *provider,
                        *policy,
                        Arc::clone(&self.clock),
                    )),
                };
                (*provider, bucket)
            })
            .collect();

        info!(providers = next.len(), "Token limit policies applied");
        self.buckets.store(Arc::new(next));
    }
}

impl fmt::Debug for TokenLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenLimiter")
            .field("providers", &self.providers())
            .finish_non_exhaustive()
    }
}
