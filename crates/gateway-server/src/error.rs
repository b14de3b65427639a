//! API error handling.
//!
//! Turns a `GatewayError` into the client response: the status it maps to,
//! an OpenAI-style JSON body and the `Retry-After` / `WWW-Authenticate`
//! headers where they apply.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{error::retry_after_secs, ApiErrorResponse, GatewayError};
use tracing::{error, warn};

/// API error wrapper
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    /// HTTP status of the response
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.0.status_code()
    }

    /// The wrapped error
    #[must_use]
    pub fn inner(&self) -> &GatewayError {
        &self.0
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiErrorResponse::from(&self.0);

        if status.is_server_error() {
            error!(
                status = %status,
                code = self.0.error_code(),
                message = %self.0,
                "API error response"
            );
        } else {
            warn!(
                status = %status,
                code = self.0.error_code(),
                message = %self.0,
                "API error response"
            );
        }

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        if let Some(wait) = self.0.retry_after() {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(wait)));
        }

        if status == StatusCode::UNAUTHORIZED {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}
