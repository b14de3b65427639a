//! Hot reload support for configuration changes.
//!
//! The watcher re-reads the configuration file when it changes, compiles
//! it, and publishes the new [`RuntimeConfig`] as a single atomic swap.
//! A file that fails to load or compile is logged and ignored; the
//! previous configuration stays in force.

use crate::loader::{ConfigError, ConfigLoader, ENV_PREFIX};
use crate::runtime::RuntimeConfig;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration watcher for hot reload
pub struct ConfigWatcher {
    path: PathBuf,
    current: Arc<ArcSwap<RuntimeConfig>>,
    updates: watch::Sender<Arc<RuntimeConfig>>,
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from an already compiled config
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, initial: RuntimeConfig) -> Self {
        let initial = Arc::new(initial);
        let (updates, _) = watch::channel(Arc::clone(&initial));
        Self {
            path: path.into(),
            current: Arc::new(ArcSwap::new(initial)),
            updates,
            watcher: None,
            shutdown_tx: None,
        }
    }

    /// Snapshot of the current configuration
    #[must_use]
    pub fn current(&self) -> Arc<RuntimeConfig> {
        self.current.load_full()
    }

    /// Receiver notified with every successfully reloaded configuration
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<RuntimeConfig>> {
        self.updates.subscribe()
    }

    /// Start watching the configuration file for changes
    ///
    /// # Errors
    /// Returns error if file watching cannot be started
    pub fn watch(&mut self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::channel::<()>(16);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let file_name = self.path.file_name().map(ToOwned::to_owned);
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
                    if relevant && ours {
                        debug!(paths = ?event.paths, "Configuration file changed");
                        // A full channel already holds a pending reload
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => error!(error = %e, "File watch error"),
            })
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        // Watch the parent directory so editors that replace the file are seen
        let watch_path = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        info!(path = %self.path.display(), "Watching configuration file");

        let path = self.path.clone();
        let current = Arc::clone(&self.current);
        let updates = self.updates.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = rx.recv() => {
                        // Let bursts of write events settle, then drain them
                        tokio::time::sleep(DEBOUNCE).await;
                        while rx.try_recv().is_ok() {}
                        Self::apply(&path, &current, &updates).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Configuration watcher shutting down");
                        break;
                    }
                }
            }
        });

        self.watcher = Some(watcher);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Reload the file now
    ///
    /// # Errors
    /// Returns error if the file fails to load or compile; the current
    /// configuration is kept in that case
    pub async fn reload(&self) -> Result<Arc<RuntimeConfig>, ConfigError> {
        let compiled = Arc::new(Self::compile(&self.path).await?);
        self.current.store(Arc::clone(&compiled));
        self.updates.send_replace(Arc::clone(&compiled));
        info!(path = %self.path.display(), "Configuration manually reloaded");
        Ok(compiled)
    }

    /// Stop watching for configuration changes
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.watcher = None;
    }

    async fn apply(
        path: &Path,
        current: &ArcSwap<RuntimeConfig>,
        updates: &watch::Sender<Arc<RuntimeConfig>>,
    ) {
        info!(path = %path.display(), "Reloading configuration");
        match Self::compile(path).await {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                current.store(Arc::clone(&compiled));
                updates.send_replace(compiled);
                info!("Configuration reloaded successfully");
            }
            Err(e) => {
                warn!(error = %e, "Rejected configuration change, keeping previous configuration");
            }
        }
    }

    async fn compile(path: &Path) -> Result<RuntimeConfig, ConfigError> {
        let config = ConfigLoader::file(path)
            .with_env_prefix(ENV_PREFIX)
            .load()
            .await?;
        RuntimeConfig::compile(&config)
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("path", &self.path)
            .field("watching", &self.watcher.is_some())
            .finish_non_exhaustive()
    }
}
