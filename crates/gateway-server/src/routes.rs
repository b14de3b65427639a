//! Router assembly.

use axum::{middleware::from_fn, routing::get, Router};
use tracing::warn;

use crate::{front_door, handlers, middleware, state::AppState};

/// Create the gateway router
///
/// Operational endpoints are explicit routes; every other request goes to
/// the front door.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check));

    if state.metrics_config.enabled {
        let path = state.metrics_config.path.as_str();
        if path.starts_with('/') {
            router = router.route(path, get(handlers::metrics_endpoint));
        } else {
            warn!(path, "Metrics path must start with '/', endpoint disabled");
        }
    }

    let cors = middleware::cors_layer(&state.cors);

    let router = router
        .fallback(front_door::handle)
        .layer(from_fn(middleware::response_time_middleware))
        .layer(from_fn(middleware::logging_middleware))
        .layer(from_fn(middleware::request_id_middleware));

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}
