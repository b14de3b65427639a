//! # AI Gateway
//!
//! Routes model traffic by request path to an ordered chain of model
//! backends, under per-provider token budgets.
//!
//! ## Usage
//!
//! ```bash
//! # Start with the first configuration file found
//! # (config.yaml, config/gateway.yaml, /etc/ai-gateway/config.yaml)
//! ai-gateway
//!
//! # Start with an explicit file
//! CONFIG_PATH=/path/to/gateway.yaml ai-gateway
//!
//! # Override settings from the environment
//! AI_GATEWAY_PORT=9000 AI_GATEWAY_LOG_LEVEL=debug ai-gateway
//! ```

use anyhow::Context;
use gateway_config::{load_config, ConfigWatcher, RuntimeConfig};
use gateway_server::{AppState, Server};
use gateway_telemetry::init_logging;
use tracing::{error, info, warn};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be up yet
        eprintln!("ai-gateway: {e:#}");
        error!(error = %format!("{e:#}"), "Application failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> anyhow::Result<()> {
    let (path, config) = load_config().await.context("loading configuration")?;
    let runtime = RuntimeConfig::compile(&config).context("validating configuration")?;

    init_logging(&runtime.observability.logging).context("initializing logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        listeners = runtime.listeners.len(),
        routes = runtime.route_table.len(),
        backends = runtime.backends.len(),
        "Starting AI gateway"
    );

    if !runtime.route_table.has_catch_all() {
        warn!("No catch-all route configured; unmatched paths are rejected with 404");
    }

    let state = AppState::from_config(&runtime).context("building gateway state")?;

    let mut watcher = ConfigWatcher::new(path.clone(), runtime.clone());
    match watcher.watch() {
        Ok(()) => {
            state.spawn_reload_listener(watcher.subscribe());
        }
        Err(e) => warn!(error = %e, "Configuration hot reload disabled"),
    }

    let server = Server::bind(&runtime.listeners, state)
        .await
        .context("binding listeners")?;
    server.run().await.context("serving")?;

    watcher.stop().await;
    Ok(())
}
