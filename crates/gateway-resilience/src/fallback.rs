//! Sequential fallback over a route's backend chain.
//!
//! Backends are tried in priority order, one at a time, each at most once.
//! An attempt is skipped when the provider's token bucket refuses it, and
//! abandoned when the backend errors or exceeds its timeout. The first
//! success wins; if none succeeds the caller gets every attempt back.

use crate::token_bucket::{Direction, TokenLimiter};
use gateway_core::{
    BackendDescriptor, BackendLookup, BackendRequest, BackendResponse, GatewayError,
    InferenceRequest, ProviderKind,
};
use gateway_routing::Route;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Backend answered
    Succeeded {
        /// Output tokens reported by the backend
        output_tokens: u32,
    },
    /// Token bucket refused the reservation
    RateLimited {
        /// Bucket that refused, if known
        direction: Option<Direction>,
        /// Wait until the reservation would fit
        retry_after: Option<Duration>,
    },
    /// Backend returned an error
    Failed {
        /// Provider status code, if any
        status: Option<u16>,
        /// Error message
        message: String,
    },
    /// Backend exceeded its timeout
    TimedOut {
        /// Timeout that elapsed
        after: Duration,
    },
    /// No client registered for the backend
    Unavailable,
}

impl AttemptOutcome {
    /// Label used in logs, metrics and audit records
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "success",
            Self::RateLimited { .. } => "rate_limited",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Unavailable => "unavailable",
        }
    }
}

/// One backend attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// Backend name
    pub backend: String,
    /// Provider kind
    pub provider: ProviderKind,
    /// Configured model
    pub model: String,
    /// What happened
    pub outcome: AttemptOutcome,
    /// Time spent on the attempt
    pub elapsed: Duration,
}

/// A successful dispatch
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// Backend response
    pub response: BackendResponse,
    /// Backend that produced it
    pub backend: Arc<BackendDescriptor>,
    /// Whether it was not the first backend of the chain
    pub used_fallback: bool,
    /// Every attempt, the successful one last
    pub attempts: Vec<Attempt>,
}

/// Every backend was tried without success
#[derive(Debug, Clone)]
pub struct Exhausted {
    /// Route name
    pub route: String,
    /// Every attempt, in order
    pub attempts: Vec<Attempt>,
}

impl Exhausted {
    /// Largest limiter hint, only when every attempt was refused by the
    /// limiter with a hint
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        let hints: Option<Vec<Duration>> = self
            .attempts
            .iter()
            .map(|a| match a.outcome {
                AttemptOutcome::RateLimited { retry_after, .. } => retry_after,
                _ => None,
            })
            .collect();
        hints.and_then(|h| h.into_iter().max())
    }

    /// Client-facing error
    #[must_use]
    pub fn to_error(&self) -> GatewayError {
        GatewayError::exhausted(&self.route, self.attempts.len(), self.retry_after())
    }
}

/// Walks a route's fallback chain under token bucket admission
#[derive(Debug, Clone)]
pub struct FallbackDispatcher {
    limiter: Arc<TokenLimiter>,
}

impl FallbackDispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new(limiter: Arc<TokenLimiter>) -> Self {
        Self { limiter }
    }

    /// The limiter reservations are made against
    #[must_use]
    pub fn limiter(&self) -> &Arc<TokenLimiter> {
        &self.limiter
    }

    /// Dispatch a request over the route's backends
    ///
    /// # Errors
    /// Returns [`Exhausted`] with the full attempt list when no backend
    /// produced a response
    pub async fn dispatch(
        &self,
        route: &Route,
        backends: &dyn BackendLookup,
        request: &InferenceRequest,
        input_tokens: u32,
    ) -> Result<Dispatched, Exhausted> {
        let messages = request.to_messages();
        let mut attempts = Vec::with_capacity(route.backends().len());

        for (position, descriptor) in route.backends().iter().enumerate() {
            let started = Instant::now();
            let max_tokens = descriptor
                .params
                .max_output_tokens
                .capped_by(request.max_tokens);
            let model = route.model_for(descriptor, request.model.as_deref());

            let attempt = |outcome: AttemptOutcome| Attempt {
                backend: descriptor.name.clone(),
                provider: descriptor.provider(),
                model: model.to_string(),
                outcome,
                elapsed: started.elapsed(),
            };

            let permit = match self.limiter.reserve(
                descriptor.provider(),
                input_tokens,
                max_tokens.value(),
            ) {
                Ok(permit) => permit,
                Err(rejection) => {
                    warn!(
                        route = %route.name(),
                        backend = %descriptor.name,
                        provider = %descriptor.provider(),
                        reason = %rejection,
                        "Backend skipped: token budget exhausted"
                    );
                    attempts.push(attempt(AttemptOutcome::RateLimited {
                        direction: rejection.direction(),
                        retry_after: rejection.retry_after(),
                    }));
                    continue;
                }
            };

            let Some(client) = backends.backend(&descriptor.name) else {
                warn!(
                    route = %route.name(),
                    backend = %descriptor.name,
                    "Backend skipped: no client registered"
                );
                // Untouched permit is released on drop
                drop(permit);
                attempts.push(attempt(AttemptOutcome::Unavailable));
                continue;
            };

            let backend_request = BackendRequest {
                model: model.to_string(),
                messages: messages.clone(),
                temperature: descriptor.params.temperature,
                max_tokens,
            };

            match tokio::time::timeout(descriptor.timeout, client.complete(&backend_request))
                .await
            {
                Ok(Ok(response)) => {
                    let output_tokens = response.usage.output_tokens;
                    self.limiter.record(permit, output_tokens);
                    let done = attempt(AttemptOutcome::Succeeded { output_tokens });
                    info!(
                        route = %route.name(),
                        backend = %descriptor.name,
                        provider = %descriptor.provider(),
                        model = %response.model,
                        output_tokens,
                        elapsed_ms = done.elapsed.as_millis() as u64,
                        fallback = position > 0,
                        "Backend attempt succeeded"
                    );
                    attempts.push(done);
                    return Ok(Dispatched {
                        response,
                        backend: Arc::clone(descriptor),
                        used_fallback: position > 0,
                        attempts,
                    });
                }
                Ok(Err(err)) => {
                    permit.forfeit();
                    let status = match &err {
                        GatewayError::Backend { status_code, .. } => *status_code,
                        _ => None,
                    };
                    let failed = attempt(AttemptOutcome::Failed {
                        status,
                        message: err.to_string(),
                    });
                    warn!(
                        route = %route.name(),
                        backend = %descriptor.name,
                        provider = %descriptor.provider(),
                        status = ?status,
                        error = %err,
                        elapsed_ms = failed.elapsed.as_millis() as u64,
                        "Backend attempt failed"
                    );
                    attempts.push(failed);
                }
                Err(_) => {
                    permit.forfeit();
                    let timed_out = attempt(AttemptOutcome::TimedOut {
                        after: descriptor.timeout,
                    });
                    warn!(
                        route = %route.name(),
                        backend = %descriptor.name,
                        provider = %descriptor.provider(),
                        timeout_ms = descriptor.timeout.as_millis() as u64,
                        "Backend attempt timed out"
                    );
                    attempts.push(timed_out);
                }
            }
        }

        warn!(
            route = %route.name(),
            attempts = attempts.len(),
            "All backends exhausted"
        );
        Err(Exhausted {
            route: route.name().to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use gateway_core::{
        Backend, BackendTarget, GenerationParams, MaxTokens, Temperature, TokenLimitPolicy, Usage,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use url::Url;

    #[derive(Clone)]
    enum Behavior {
        Reply { output_tokens: u32 },
        Fail { status: u16 },
        Hang,
    }

    struct MockBackend {
        name: String,
        kind: ProviderKind,
        behavior: Behavior,
        calls: AtomicU32,
        seen_max_tokens: AtomicU32,
    }

    impl MockBackend {
        fn new(name: &str, kind: ProviderKind, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                kind,
                behavior,
                calls: AtomicU32::new(0),
                seen_max_tokens: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn complete(
            &self,
            request: &BackendRequest,
        ) -> Result<BackendResponse, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_max_tokens.store(request.max_tokens.value(), Ordering::SeqCst);
            match self.behavior {
                Behavior::Reply { output_tokens } => Ok(BackendResponse {
                    text: format!("answer from {}", self.name),
                    model: request.model.clone(),
                    usage: Usage::new(10, output_tokens),
                }),
                Behavior::Fail { status } => Err(GatewayError::backend(
                    &self.name,
                    "upstream error",
                    Some(status),
                )),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("timeout fires first")
                }
            }
        }
    }

    #[derive(Default)]
    struct Lookup(HashMap<String, Arc<dyn Backend>>);

    impl Lookup {
        fn with(mut self, backend: Arc<MockBackend>) -> Self {
            self.0.insert(backend.name.clone(), backend);
            self
        }
    }

    impl BackendLookup for Lookup {
        fn backend(&self, name: &str) -> Option<Arc<dyn Backend>> {
            self.0.get(name).cloned()
        }
    }

    fn descriptor(
        name: &str,
        kind: ProviderKind,
        priority: u32,
        max: u32,
    ) -> Arc<BackendDescriptor> {
        let target = match kind {
            ProviderKind::OpenAI => BackendTarget::OpenAI { base_url: None },
            ProviderKind::Anthropic => BackendTarget::Anthropic { base_url: None },
            ProviderKind::Google => BackendTarget::Google { base_url: None },
            ProviderKind::Ollama => BackendTarget::Ollama {
                endpoint: Url::parse("http://localhost:11434").expect("url"),
            },
        };
        Arc::new(
            BackendDescriptor::new(
                name,
                target,
                format!("{name}-model"),
                GenerationParams {
                    temperature: Temperature::default(),
                    max_output_tokens: MaxTokens::new(max).expect("valid"),
                },
            )
            .with_priority(priority)
            .with_timeout(Duration::from_secs(5)),
        )
    }

    fn limiter(rate: f64) -> Arc<TokenLimiter> {
        let policies = ProviderKind::ALL
            .iter()
            .map(|k| (*k, TokenLimitPolicy::new(rate, rate)))
            .collect();
        Arc::new(TokenLimiter::with_clock(
            &policies,
            Arc::new(ManualClock::new()),
        ))
    }

    fn request() -> InferenceRequest {
        InferenceRequest::prompt("How should I allocate my 401k?")
    }

    #[tokio::test]
    async fn test_primary_success_no_fallback() {
        let primary = MockBackend::new(
            "primary",
            ProviderKind::OpenAI,
            Behavior::Reply { output_tokens: 50 },
        );
        let secondary = MockBackend::new(
            "secondary",
            ProviderKind::Anthropic,
            Behavior::Reply { output_tokens: 50 },
        );
        let route = Route::new(
            "investment-advisor",
            ["/v1/investment"],
            vec![
                descriptor("primary", ProviderKind::OpenAI, 1, 500),
                descriptor("secondary", ProviderKind::Anthropic, 2, 500),
            ],
        )
        .expect("route");
        let lookup = Lookup::default().with(primary.clone()).with(secondary.clone());
        let dispatcher = FallbackDispatcher::new(limiter(10_000.0));

        let dispatched = dispatcher
            .dispatch(&route, &lookup, &request(), 20)
            .await
            .expect("dispatched");

        assert_eq!(dispatched.backend.name, "primary");
        assert!(!dispatched.used_fallback);
        assert_eq!(dispatched.attempts.len(), 1);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);

        // 500 reserved, 50 used: 450 credited back
        let snapshot = dispatcher
            .limiter()
            .snapshot(ProviderKind::OpenAI)
            .expect("bucket");
        assert_eq!(snapshot.output_available, 9_950.0);
        assert_eq!(snapshot.input_available, 9_980.0);
    }

    #[tokio::test]
    async fn test_failure_falls_back_once_per_backend() {
        let primary = MockBackend::new(
            "primary",
            ProviderKind::OpenAI,
            Behavior::Fail { status: 500 },
        );
        let secondary = MockBackend::new(
            "secondary",
            ProviderKind::Anthropic,
            Behavior::Reply { output_tokens: 30 },
        );
        let route = Route::new(
            "loan-officer",
            ["/v1/loan"],
            vec![
                descriptor("secondary", ProviderKind::Anthropic, 2, 500),
                descriptor("primary", ProviderKind::OpenAI, 1, 500),
            ],
        )
        .expect("route");
        let lookup = Lookup::default().with(primary.clone()).with(secondary.clone());
        let dispatcher = FallbackDispatcher::new(limiter(10_000.0));

        let dispatched = dispatcher
            .dispatch(&route, &lookup, &request(), 20)
            .await
            .expect("dispatched");

        assert_eq!(dispatched.backend.name, "secondary");
        assert!(dispatched.used_fallback);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(
            dispatched.attempts[0].outcome,
            AttemptOutcome::Failed {
                status: Some(500),
                message: "Backend error: primary - upstream error".to_string(),
            }
        );

        // Failed attempt is sunk cost
        let openai = dispatcher
            .limiter()
            .snapshot(ProviderKind::OpenAI)
            .expect("bucket");
        assert_eq!(openai.output_available, 9_500.0);
    }

    #[tokio::test]
    async fn test_rate_limited_backend_is_skipped_without_call() {
        let primary = MockBackend::new(
            "primary",
            ProviderKind::OpenAI,
            Behavior::Reply { output_tokens: 10 },
        );
        let local = MockBackend::new(
            "local",
            ProviderKind::Ollama,
            Behavior::Reply { output_tokens: 10 },
        );
        let route = Route::new(
            "customer-support",
            ["/v1/customer"],
            vec![
                descriptor("primary", ProviderKind::OpenAI, 1, 100),
                descriptor("local", ProviderKind::Ollama, 2, 100),
            ],
        )
        .expect("route");
        let lookup = Lookup::default().with(primary.clone()).with(local.clone());
        let dispatcher = FallbackDispatcher::new(limiter(1_000.0));

        // Prompt larger than the bucket: never fits either provider's input
        let result = dispatcher.dispatch(&route, &lookup, &request(), 1_500).await;
        let exhausted = result.expect_err("exhausted");
        assert_eq!(exhausted.attempts.len(), 2);
        assert_eq!(primary.calls(), 0);
        assert_eq!(local.calls(), 0);
        assert_eq!(exhausted.retry_after(), None);

        // Fits the bucket: primary admitted
        let dispatched = dispatcher
            .dispatch(&route, &lookup, &request(), 950)
            .await
            .expect("dispatched");
        assert_eq!(dispatched.backend.name, "primary");

        // Primary's input bucket is now nearly empty; the local model serves
        let dispatched = dispatcher
            .dispatch(&route, &lookup, &request(), 200)
            .await
            .expect("dispatched");
        assert_eq!(dispatched.backend.name, "local");
        assert!(matches!(
            dispatched.attempts[0].outcome,
            AttemptOutcome::RateLimited {
                direction: Some(Direction::Input),
                retry_after: Some(_),
            }
        ));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retry_hint_when_all_rate_limited() {
        let primary = MockBackend::new(
            "primary",
            ProviderKind::OpenAI,
            Behavior::Reply { output_tokens: 10 },
        );
        let route = Route::new(
            "general",
            ["/v1/*"],
            vec![descriptor("primary", ProviderKind::OpenAI, 1, 100)],
        )
        .expect("route");
        let lookup = Lookup::default().with(primary.clone());
        let dispatcher = FallbackDispatcher::new(limiter(1_000.0));

        dispatcher
            .dispatch(&route, &lookup, &request(), 900)
            .await
            .expect("first fits");

        let exhausted = dispatcher
            .dispatch(&route, &lookup, &request(), 600)
            .await
            .expect_err("bucket drained");
        // 100 left, 500 missing at 1000/s
        assert_eq!(exhausted.retry_after(), Some(Duration::from_millis(500)));
        let error = exhausted.to_error();
        assert_eq!(error.status_code(), http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.retry_after(), Some(Duration::from_millis(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_moves_to_next_backend() {
        let slow = MockBackend::new("slow", ProviderKind::Google, Behavior::Hang);
        let fast = MockBackend::new(
            "fast",
            ProviderKind::Ollama,
            Behavior::Reply { output_tokens: 5 },
        );
        let route = Route::new(
            "general",
            ["/*"],
            vec![
                descriptor("slow", ProviderKind::Google, 1, 100),
                descriptor("fast", ProviderKind::Ollama, 2, 100),
            ],
        )
        .expect("route");
        let lookup = Lookup::default().with(slow.clone()).with(fast.clone());
        let dispatcher = FallbackDispatcher::new(limiter(10_000.0));

        let dispatched = dispatcher
            .dispatch(&route, &lookup, &request(), 10)
            .await
            .expect("dispatched");

        assert_eq!(dispatched.backend.name, "fast");
        assert_eq!(
            dispatched.attempts[0].outcome,
            AttemptOutcome::TimedOut {
                after: Duration::from_secs(5)
            }
        );
        // Timed out attempt is sunk cost
        let google = dispatcher
            .limiter()
            .snapshot(ProviderKind::Google)
            .expect("bucket");
        assert_eq!(google.output_available, 9_900.0);
    }

    #[tokio::test]
    async fn test_missing_client_is_unavailable_and_released() {
        let route = Route::new(
            "general",
            ["/*"],
            vec![descriptor("ghost", ProviderKind::OpenAI, 1, 100)],
        )
        .expect("route");
        let dispatcher = FallbackDispatcher::new(limiter(10_000.0));

        let exhausted = dispatcher
            .dispatch(&route, &Lookup::default(), &request(), 10)
            .await
            .expect_err("exhausted");

        assert_eq!(exhausted.attempts[0].outcome, AttemptOutcome::Unavailable);
        assert_eq!(exhausted.retry_after(), None);
        let openai = dispatcher
            .limiter()
            .snapshot(ProviderKind::OpenAI)
            .expect("bucket");
        assert_eq!(openai.output_available, 10_000.0);
    }

    #[tokio::test]
    async fn test_client_max_tokens_caps_backend_limit() {
        let primary = MockBackend::new(
            "primary",
            ProviderKind::OpenAI,
            Behavior::Reply { output_tokens: 1 },
        );
        let route = Route::new(
            "general",
            ["/*"],
            vec![descriptor("primary", ProviderKind::OpenAI, 1, 800)],
        )
        .expect("route");
        let lookup = Lookup::default().with(primary.clone());
        let dispatcher = FallbackDispatcher::new(limiter(10_000.0));

        dispatcher
            .dispatch(&route, &lookup, &request().with_max_tokens(64), 10)
            .await
            .expect("dispatched");
        assert_eq!(primary.seen_max_tokens.load(Ordering::SeqCst), 64);

        dispatcher
            .dispatch(&route, &lookup, &request().with_max_tokens(4_000), 10)
            .await
            .expect("dispatched");
        assert_eq!(primary.seen_max_tokens.load(Ordering::SeqCst), 800);
    }

    #[tokio::test]
    async fn test_client_model_applies_to_allowed_local_backends() {
        let cloud = MockBackend::new(
            "cloud",
            ProviderKind::OpenAI,
            Behavior::Fail { status: 500 },
        );
        let local = MockBackend::new(
            "local",
            ProviderKind::Ollama,
            Behavior::Reply { output_tokens: 5 },
        );
        let route = Route::new(
            "loan-local",
            ["/v1/loan-local"],
            vec![
                descriptor("cloud", ProviderKind::OpenAI, 1, 100),
                descriptor("local", ProviderKind::Ollama, 2, 100),
            ],
        )
        .expect("route")
        .with_allowed_models(["phi-2"]);
        let lookup = Lookup::default().with(cloud.clone()).with(local.clone());
        let dispatcher = FallbackDispatcher::new(limiter(10_000.0));

        let dispatched = dispatcher
            .dispatch(&route, &lookup, &request().with_model("phi-2"), 10)
            .await
            .expect("dispatched");
        assert_eq!(dispatched.attempts[0].model, "cloud-model");
        assert_eq!(dispatched.attempts[1].model, "phi-2");
        assert_eq!(dispatched.response.model, "phi-2");

        // Models outside the route's list fall back to the configured one
        let dispatched = dispatcher
            .dispatch(&route, &lookup, &request().with_model("codellama:7b"), 10)
            .await
            .expect("dispatched");
        assert_eq!(dispatched.response.model, "local-model");
    }
}
