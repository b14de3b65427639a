//! HTTP middleware for the gateway.
//!
//! Provides middleware for:
//! - Request ID injection
//! - Request logging
//! - Response timing
//! - CORS from configuration

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use gateway_config::CorsConfig;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Request id header
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Response time header
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";
/// Provider input rate of the serving backend
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Input tokens left in the serving provider's bucket
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Request ID extension for sharing across handlers
#[derive(Clone, Debug)]
pub struct RequestIdExt(pub String);

/// CORS layer from configuration, `None` when disabled
pub fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }

    let allow_origin = if config.allow_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allow_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .expose_headers([
                HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
                HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
                HeaderName::from_static(REQUEST_ID_HEADER),
            ])
            .max_age(config.max_age),
    )
}

/// Request ID middleware - adds request ID to request and response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    request
        .extensions_mut()
        .insert(RequestIdExt(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let request_id = request
        .extensions()
        .get::<RequestIdExt>()
        .map_or_else(|| "unknown".to_string(), |r| r.0.clone());

    let span = info_span!(
        "http_request",
        method = %method,
        uri = %uri,
        request_id = %request_id,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span).await;

    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        request_id = %request_id,
        "Request completed"
    );

    response
}

/// Response time middleware - adds X-Response-Time header
pub async fn response_time_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let mut response = next.run(request).await;

    let duration_ms = format!("{}ms", start.elapsed().as_millis());
    if let Ok(value) = HeaderValue::from_str(&duration_ms) {
        response.headers_mut().insert(RESPONSE_TIME_HEADER, value);
    }

    response
}
