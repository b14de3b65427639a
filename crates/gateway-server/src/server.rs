//! HTTP server implementation.

use crate::{routes::create_router, state::AppState};
use futures::future::try_join_all;
use gateway_config::ListenerConfig;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// HTTP server for the gateway: one router served on every listener
pub struct Server {
    listeners: Vec<(String, TcpListener)>,
    state: AppState,
}

impl Server {
    /// Bind every configured listener
    ///
    /// # Errors
    /// Returns error if any listener cannot be bound; nothing is served then
    pub async fn bind(configs: &[ListenerConfig], state: AppState) -> Result<Self, ServerError> {
        if configs.is_empty() {
            return Err(ServerError::Config("no listeners configured".to_string()));
        }

        let mut listeners = Vec::with_capacity(configs.len());
        for config in configs {
            let addr = config.socket_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| ServerError::Bind(format!("{} ({addr}): {e}", config.name)))?;
            info!(listener = %config.name, address = %addr, "Listener bound");
            listeners.push((config.name.clone(), listener));
        }

        Ok(Self { listeners, state })
    }

    /// Bound addresses, in listener order
    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(_, l)| l.local_addr().ok())
            .collect()
    }

    /// Serve until Ctrl-C or SIGTERM
    ///
    /// # Errors
    /// Returns error if a listener fails while serving
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until the given future completes, then drain in-flight requests
    ///
    /// # Errors
    /// Returns error if a listener fails while serving
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = create_router(self.state);
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        });

        let servers = self.listeners.into_iter().map(|(name, listener)| {
            let router = router.clone();
            let mut stop = stop_rx.clone();
            async move {
                info!(listener = %name, "Serving");
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = stop.wait_for(|stopped| *stopped).await;
                    })
                    .await
                    .map_err(|e| {
                        error!(listener = %name, error = %e, "Listener failed");
                        ServerError::Serve(format!("{name}: {e}"))
                    })
            }
        });

        try_join_all(servers).await?;

        info!("Server shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listeners", &self.local_addrs())
            .finish_non_exhaustive()
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),
    /// Server error during operation
    #[error("Server error: {0}")]
    Serve(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Shutdown signal handler
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
