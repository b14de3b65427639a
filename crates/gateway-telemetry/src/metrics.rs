//! Prometheus metrics for the gateway.
//!
//! Provides metrics for:
//! - Request counts and latencies per route
//! - Token usage per provider and direction
//! - Fallback events and backend attempts
//! - Token bucket rejections and availability
//! - Authentication failures and configuration reloads

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tracing::{debug, error, info};

const NAMESPACE: &str = "ai_gateway";

const LATENCY_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// Metrics for a single front-door request
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    /// Matched route, or `none`
    pub route: String,
    /// Final outcome label (`success`, `exhausted`, `unauthorized`, ...)
    pub outcome: String,
    /// End-to-end latency
    pub latency: Duration,
}

/// Main metrics registry and collectors
pub struct Metrics {
    registry: Registry,
    requests_total: CounterVec,
    request_duration: HistogramVec,
    tokens_total: CounterVec,
    fallback_total: CounterVec,
    limiter_rejections: CounterVec,
    backend_attempts: CounterVec,
    auth_failures: CounterVec,
    bucket_available: GaugeVec,
    config_reloads: CounterVec,
}

impl Metrics {
    /// Create a new metrics instance with its own registry
    ///
    /// # Errors
    /// Returns error if metrics cannot be registered
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("requests_total", "Total number of requests").namespace(NAMESPACE),
            &["route", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "Request latency in seconds")
                .namespace(NAMESPACE)
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["route"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let tokens_total = CounterVec::new(
            Opts::new("tokens_total", "Tokens processed").namespace(NAMESPACE),
            &["provider", "direction"],
        )?;
        registry.register(Box::new(tokens_total.clone()))?;

        let fallback_total = CounterVec::new(
            Opts::new(
                "fallback_total",
                "Requests served by a backend other than the first of the chain",
            )
            .namespace(NAMESPACE),
            &["route", "backend"],
        )?;
        registry.register(Box::new(fallback_total.clone()))?;

        let limiter_rejections = CounterVec::new(
            Opts::new(
                "limiter_rejections_total",
                "Backend attempts rejected by the token bucket",
            )
            .namespace(NAMESPACE),
            &["provider", "direction"],
        )?;
        registry.register(Box::new(limiter_rejections.clone()))?;

        let backend_attempts = CounterVec::new(
            Opts::new("backend_attempts_total", "Backend attempts by outcome").namespace(NAMESPACE),
            &["backend", "provider", "outcome"],
        )?;
        registry.register(Box::new(backend_attempts.clone()))?;

        let auth_failures = CounterVec::new(
            Opts::new("auth_failures_total", "Rejected credentials").namespace(NAMESPACE),
            &["route"],
        )?;
        registry.register(Box::new(auth_failures.clone()))?;

        let bucket_available = GaugeVec::new(
            Opts::new(
                "bucket_available_tokens",
                "Tokens currently available in a provider bucket",
            )
            .namespace(NAMESPACE),
            &["provider", "direction"],
        )?;
        registry.register(Box::new(bucket_available.clone()))?;

        let config_reloads = CounterVec::new(
            Opts::new("config_reloads_total", "Configuration reloads").namespace(NAMESPACE),
            &["result"],
        )?;
        registry.register(Box::new(config_reloads.clone()))?;

        info!("Metrics initialized");

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            tokens_total,
            fallback_total,
            limiter_rejections,
            backend_attempts,
            auth_failures,
            bucket_available,
            config_reloads,
        })
    }

    /// Record a completed request
    pub fn record_request(&self, metrics: &RequestMetrics) {
        self.requests_total
            .with_label_values(&[metrics.route.as_str(), metrics.outcome.as_str()])
            .inc();
        self.request_duration
            .with_label_values(&[metrics.route.as_str()])
            .observe(metrics.latency.as_secs_f64());

        debug!(
            route = %metrics.route,
            outcome = %metrics.outcome,
            latency_ms = metrics.latency.as_millis(),
            "Request metrics recorded"
        );
    }

    /// Record token usage of a served request
    pub fn record_tokens(&self, provider: &str, input: u32, output: u32) {
        self.tokens_total
            .with_label_values(&[provider, "input"])
            .inc_by(f64::from(input));
        self.tokens_total
            .with_label_values(&[provider, "output"])
            .inc_by(f64::from(output));
    }

    /// Record a request served by a fallback backend
    pub fn record_fallback(&self, route: &str, backend: &str) {
        self.fallback_total.with_label_values(&[route, backend]).inc();
    }

    /// Record a token bucket rejection
    pub fn record_limiter_rejection(&self, provider: &str, direction: &str) {
        self.limiter_rejections
            .with_label_values(&[provider, direction])
            .inc();
    }

    /// Record one backend attempt
    pub fn record_attempt(&self, backend: &str, provider: &str, outcome: &str) {
        self.backend_attempts
            .with_label_values(&[backend, provider, outcome])
            .inc();
    }

    /// Record an authentication failure
    pub fn record_auth_failure(&self, route: &str) {
        self.auth_failures.with_label_values(&[route]).inc();
    }

    /// Update a bucket availability gauge
    pub fn set_bucket_available(&self, provider: &str, direction: &str, available: f64) {
        self.bucket_available
            .with_label_values(&[provider, direction])
            .set(available);
    }

    /// Record a configuration reload attempt
    pub fn record_config_reload(&self, success: bool) {
        let result = if success { "success" } else { "rejected" };
        self.config_reloads.with_label_values(&[result]).inc();
    }

    /// Get metrics as Prometheus text format
    #[must_use]
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Get the Prometheus registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
