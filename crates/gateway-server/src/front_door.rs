//! The gateway front door.
//!
//! Every request not claimed by an operational endpoint lands here and
//! moves through `Received → Authenticated → Routed → Dispatching` to
//! exactly one terminal phase. The route is looked up first because it
//! names the security policy, but the request only counts as routed once
//! its caller is authenticated.

use crate::error::ApiError;
use crate::middleware::{RequestIdExt, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER};
use crate::state::{AppState, RoutingSnapshot};
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use chrono::Utc;
use gateway_core::{GatewayError, GatewayResponse, InferenceRequest, Usage};
use gateway_resilience::{Attempt, AttemptOutcome, Dispatched, Exhausted};
use gateway_routing::Route;
use gateway_telemetry::{AttemptRecord, RequestAuditRecord, RequestMetrics};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Route that served the request
pub const GATEWAY_ROUTE_HEADER: &str = "x-gateway-route";
/// Backend that served the request
pub const GATEWAY_BACKEND_HEADER: &str = "x-gateway-backend";

/// Why a request was turned away before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No route, or a route that does not accept the method
    Route,
    /// Missing or invalid credentials
    Auth,
    /// Body failed to parse or validate
    Request,
}

/// Lifecycle of one front-door request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Accepted by the listener
    Received,
    /// Caller authenticated (or the route is public)
    Authenticated,
    /// Route bound to the request
    Routed,
    /// Walking the fallback chain
    Dispatching,
    /// A backend answered
    Succeeded,
    /// Every backend failed or was refused
    Exhausted,
    /// Turned away before dispatch
    Rejected(RejectReason),
}

impl RequestPhase {
    fn rank(self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Authenticated => 1,
            Self::Routed => 2,
            Self::Dispatching => 3,
            Self::Succeeded | Self::Exhausted | Self::Rejected(_) => 4,
        }
    }

    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.rank() == 4
    }

    /// Label used in audit records
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authenticated => "authenticated",
            Self::Routed => "routed",
            Self::Dispatching => "dispatching",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Rejected(RejectReason::Route) => "rejected_route",
            Self::Rejected(RejectReason::Auth) => "rejected_auth",
            Self::Rejected(RejectReason::Request) => "rejected_request",
        }
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request bookkeeping
#[derive(Debug)]
pub struct RequestContext {
    /// Request identifier
    pub request_id: String,
    /// HTTP method
    pub method: Method,
    /// Request path
    pub path: String,
    /// Route, once bound
    pub route: Option<Arc<Route>>,
    phase: RequestPhase,
    /// Estimated input tokens
    pub input_tokens: u32,
    /// Backend attempts
    pub attempts: Vec<Attempt>,
    started: Instant,
}

impl RequestContext {
    /// New context in the `Received` phase
    #[must_use]
    pub fn new(request_id: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            method,
            path: path.into(),
            route: None,
            phase: RequestPhase::Received,
            input_tokens: 0,
            attempts: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Move to a later phase; returns false and stays put otherwise
    pub fn advance(&mut self, next: RequestPhase) -> bool {
        if self.phase.is_terminal() || next.rank() <= self.phase.rank() {
            warn!(
                request_id = %self.request_id,
                from = %self.phase,
                to = %next,
                "Ignoring backward phase transition"
            );
            return false;
        }
        self.phase = next;
        true
    }

    fn route_name(&self) -> Option<String> {
        self.route.as_ref().map(|r| r.name().to_string())
    }
}

/// Fallback handler: every non-operational request
pub async fn handle(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestIdExt>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id.map_or_else(|| Uuid::new_v4().to_string(), |Extension(id)| id.0);
    let mut ctx = RequestContext::new(request_id, method, uri.path());

    // One snapshot for the whole request, whatever reloads happen meanwhile
    let snapshot = state.snapshot();

    match run(&state, &snapshot, &mut ctx, &headers, &body).await {
        Ok(served) => {
            let response = served.to_response(&state, &snapshot);
            finish(&state, &ctx, "success", StatusCode::OK, served.output_tokens);
            response
        }
        Err(err) => {
            let outcome = err.error_code().to_string();
            let response = ApiError(err).into_response();
            finish(&state, &ctx, &outcome, response.status(), 0);
            response
        }
    }
}

struct Served {
    response: GatewayResponse,
    output_tokens: u32,
}

impl Served {
    fn to_response(&self, state: &AppState, snapshot: &RoutingSnapshot) -> Response {
        let provider = self.response.provider;
        let mut response = (StatusCode::OK, Json(&self.response)).into_response();
        let headers = response.headers_mut();

        if let Some(policy) = snapshot.token_limits.get(&provider) {
            headers.insert(
                RATE_LIMIT_LIMIT_HEADER,
                HeaderValue::from(policy.input_tokens_per_second.floor() as u64),
            );
        }
        if let Some(bucket) = state.limiter().snapshot(provider) {
            headers.insert(
                RATE_LIMIT_REMAINING_HEADER,
                HeaderValue::from(bucket.input_available.max(0.0).floor() as u64),
            );
        }
        if let Ok(value) = HeaderValue::from_str(&self.response.route) {
            headers.insert(GATEWAY_ROUTE_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.response.backend) {
            headers.insert(GATEWAY_BACKEND_HEADER, value);
        }
        response
    }
}

async fn run(
    state: &AppState,
    snapshot: &RoutingSnapshot,
    ctx: &mut RequestContext,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Served, GatewayError> {
    let route = snapshot.route_table.match_path(&ctx.path).map_err(|e| {
        ctx.advance(RequestPhase::Rejected(RejectReason::Route));
        e
    })?;

    if ctx.method != Method::POST {
        ctx.route = Some(route);
        ctx.advance(RequestPhase::Rejected(RejectReason::Route));
        return Err(GatewayError::method_not_allowed(ctx.method.as_str()));
    }

    if let Some(policy_name) = route.security_policy() {
        let policy = snapshot.security_policy(policy_name).ok_or_else(|| {
            ctx.advance(RequestPhase::Rejected(RejectReason::Auth));
            GatewayError::internal(format!("Security policy '{policy_name}' is not loaded"))
        })?;

        match state.authenticator.authenticate(policy, headers).await {
            Ok(principal) => {
                debug!(
                    request_id = %ctx.request_id,
                    subject = ?principal.subject,
                    policy = %principal.policy,
                    "Caller authenticated"
                );
            }
            Err(e) => {
                state.metrics.record_auth_failure(route.name());
                ctx.route = Some(route);
                ctx.advance(RequestPhase::Rejected(RejectReason::Auth));
                return Err(e.into());
            }
        }
    }
    ctx.advance(RequestPhase::Authenticated);

    ctx.route = Some(Arc::clone(&route));
    ctx.advance(RequestPhase::Routed);

    let request = parse_body(body).map_err(|e| {
        ctx.advance(RequestPhase::Rejected(RejectReason::Request));
        e
    })?;

    ctx.input_tokens = state.estimator.estimate_messages(&request.to_messages());
    ctx.advance(RequestPhase::Dispatching);

    debug!(
        request_id = %ctx.request_id,
        route = %route.name(),
        input_tokens = ctx.input_tokens,
        user = ?request.user,
        requested_model = ?request.model,
        "Dispatching request"
    );

    let result = state
        .dispatcher
        .dispatch(&route, &snapshot.registry, &request, ctx.input_tokens)
        .await;

    match result {
        Ok(dispatched) => {
            ctx.advance(RequestPhase::Succeeded);
            let served = served(ctx, &route, &request, dispatched);
            record_attempts(state, &ctx.attempts);

            let response = &served.response;
            state.metrics.record_tokens(
                response.provider.as_str(),
                response.usage.input_tokens,
                response.usage.output_tokens,
            );
            if response.used_fallback {
                state.metrics.record_fallback(route.name(), &response.backend);
            }
            Ok(served)
        }
        Err(exhausted) => {
            ctx.advance(RequestPhase::Exhausted);
            let err = exhausted.to_error();
            let Exhausted { attempts, .. } = exhausted;
            ctx.attempts = attempts;
            record_attempts(state, &ctx.attempts);
            warn!(
                request_id = %ctx.request_id,
                route = %route.name(),
                attempts = ctx.attempts.len(),
                retry_after_ms = err.retry_after().map(|d| d.as_millis() as u64),
                "Fallback chain exhausted"
            );
            Err(err)
        }
    }
}

fn parse_body(body: &[u8]) -> Result<InferenceRequest, GatewayError> {
    let request: InferenceRequest = serde_json::from_slice(body).map_err(|e| {
        GatewayError::validation(format!("Invalid JSON body: {e}"), None, "invalid_json")
    })?;
    request.validate()?;
    Ok(request)
}

fn served(
    ctx: &mut RequestContext,
    route: &Route,
    request: &InferenceRequest,
    dispatched: Dispatched,
) -> Served {
    let Dispatched {
        response,
        backend,
        used_fallback,
        attempts,
    } = dispatched;
    ctx.attempts = attempts;

    let input_tokens = if response.usage.input_tokens > 0 {
        response.usage.input_tokens
    } else {
        ctx.input_tokens
    };
    let output_tokens = response.usage.output_tokens;

    info!(
        request_id = %ctx.request_id,
        route = %route.name(),
        backend = %backend.name,
        model = %response.model,
        used_fallback,
        input_tokens,
        output_tokens,
        "Request served"
    );

    Served {
        response: GatewayResponse {
            id: ctx.request_id.clone(),
            response: response.text,
            route: route.name().to_string(),
            backend: backend.name.clone(),
            provider: backend.provider(),
            model: response.model,
            used_fallback,
            original_model: used_fallback.then(|| {
                route
                    .model_for(route.primary(), request.model.as_deref())
                    .to_string()
            }),
            timestamp: Utc::now(),
            usage: Usage::new(input_tokens, output_tokens),
        },
        output_tokens,
    }
}

fn record_attempts(state: &AppState, attempts: &[Attempt]) {
    let metrics = &state.metrics;

    for attempt in attempts {
        let provider = attempt.provider.as_str();
        metrics.record_attempt(&attempt.backend, provider, attempt.outcome.as_str());

        if let AttemptOutcome::RateLimited {
            direction: Some(direction),
            ..
        } = &attempt.outcome
        {
            metrics.record_limiter_rejection(provider, direction.as_str());
        }
    }

    if !attempts.is_empty() {
        state.refresh_bucket_gauges();
    }
}

/// Record metrics and the audit record of a finished request
fn finish(
    state: &AppState,
    ctx: &RequestContext,
    outcome: &str,
    status: StatusCode,
    output_tokens: u32,
) {
    let latency = ctx.started.elapsed();
    let route = ctx.route_name();

    state.metrics.record_request(&RequestMetrics {
        route: route.clone().unwrap_or_else(|| "none".to_string()),
        outcome: outcome.to_string(),
        latency,
    });

    RequestAuditRecord {
        request_id: ctx.request_id.clone(),
        method: ctx.method.to_string(),
        path: ctx.path.clone(),
        route,
        phase: ctx.phase().to_string(),
        outcome: outcome.to_string(),
        status: status.as_u16(),
        attempts: ctx.attempts.iter().map(attempt_record).collect(),
        input_tokens: ctx.input_tokens,
        output_tokens,
        latency_ms: latency.as_millis() as u64,
        timestamp: Utc::now(),
    }
    .emit();
}

fn attempt_record(attempt: &Attempt) -> AttemptRecord {
    let detail = match &attempt.outcome {
        AttemptOutcome::Failed { status, message } => Some(match status {
            Some(code) => format!("HTTP {code}: {message}"),
            None => message.clone(),
        }),
        AttemptOutcome::RateLimited {
            direction,
            retry_after,
        } => Some(format!(
            "{} budget, retry after {}",
            direction.map_or("unknown", |d| d.as_str()),
            retry_after.map_or_else(|| "never".to_string(), |d| format!("{}ms", d.as_millis()))
        )),
        AttemptOutcome::TimedOut { after } => {
            Some(format!("timed out after {}ms", after.as_millis()))
        }
        AttemptOutcome::Succeeded { .. } | AttemptOutcome::Unavailable => None,
    };

    AttemptRecord {
        backend: attempt.backend.clone(),
        provider: attempt.provider.as_str().to_string(),
        model: attempt.model.clone(),
        outcome: attempt.outcome.as_str().to_string(),
        detail,
        elapsed_ms: attempt.elapsed.as_millis() as u64,
    }
}
