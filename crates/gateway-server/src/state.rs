//! Application state shared across handlers.
//!
//! Everything a configuration reload may change lives in one
//! [`RoutingSnapshot`] behind an `ArcSwap`: a request loads the snapshot
//! once and sees a consistent route table, backend registry and policy set
//! for its whole lifetime, while reloads swap the pointer atomically.

use crate::auth::Authenticator;
use crate::server::ServerError;
use arc_swap::ArcSwap;
use gateway_config::{CorsConfig, MetricsConfig, RuntimeConfig, SecurityPolicy};
use gateway_core::{CharTokenEstimator, ProviderKind, TokenEstimator, TokenLimitPolicy};
use gateway_providers::BackendRegistry;
use gateway_resilience::{Clock, FallbackDispatcher, SystemClock, TokenLimiter};
use gateway_routing::RouteTable;
use gateway_telemetry::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The hot-swappable part of the runtime
#[derive(Debug)]
pub struct RoutingSnapshot {
    /// Route table
    pub route_table: RouteTable,
    /// Backend clients
    pub registry: BackendRegistry,
    /// Security policies by name
    pub security_policies: HashMap<String, Arc<SecurityPolicy>>,
    /// Token policies by provider
    pub token_limits: HashMap<ProviderKind, TokenLimitPolicy>,
}

impl RoutingSnapshot {
    /// Build a snapshot with backend clients created from configuration
    ///
    /// # Errors
    /// Returns error if a backend client cannot be created
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ServerError> {
        let registry = BackendRegistry::from_config(config)
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(Self::with_registry(config, registry))
    }

    /// Build a snapshot around an existing registry
    #[must_use]
    pub fn with_registry(config: &RuntimeConfig, registry: BackendRegistry) -> Self {
        Self {
            route_table: config.route_table.clone(),
            registry,
            security_policies: config.security_policies.clone(),
            token_limits: config.token_limits.clone(),
        }
    }

    /// Security policy by name
    #[must_use]
    pub fn security_policy(&self, name: &str) -> Option<&Arc<SecurityPolicy>> {
        self.security_policies.get(name)
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    snapshot: Arc<ArcSwap<RoutingSnapshot>>,
    /// Fallback dispatcher (owns the token limiter)
    pub dispatcher: Arc<FallbackDispatcher>,
    /// Bearer token verification
    pub authenticator: Arc<Authenticator>,
    /// Input token estimator
    pub estimator: Arc<dyn TokenEstimator>,
    /// Metrics collector
    pub metrics: Arc<Metrics>,
    /// CORS settings, fixed at startup
    pub cors: Arc<CorsConfig>,
    /// Metrics endpoint settings, fixed at startup
    pub metrics_config: Arc<MetricsConfig>,
}

impl AppState {
    /// Create a new application state builder
    #[must_use]
    pub fn builder(config: &RuntimeConfig) -> AppStateBuilder {
        AppStateBuilder::new(config)
    }

    /// State with backend clients created from configuration
    ///
    /// # Errors
    /// Returns error if a backend client or the metrics registry cannot be
    /// created
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ServerError> {
        Self::builder(config).build()
    }

    /// Current routing snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.snapshot.load_full()
    }

    /// The token limiter
    #[must_use]
    pub fn limiter(&self) -> &Arc<TokenLimiter> {
        self.dispatcher.limiter()
    }

    /// Publish current bucket balances of every limited provider
    pub fn refresh_bucket_gauges(&self) {
        let limiter = self.limiter();
        for provider in limiter.providers() {
            if let Some(bucket) = limiter.snapshot(provider) {
                let name = provider.as_str();
                self.metrics
                    .set_bucket_available(name, "input", bucket.input_available);
                self.metrics
                    .set_bucket_available(name, "output", bucket.output_available);
            }
        }
    }

    /// Swap in a new configuration
    ///
    /// In-flight requests finish on the snapshot they loaded. Listener,
    /// CORS and metrics settings need a restart to change.
    ///
    /// # Errors
    /// Returns error if the new backend clients cannot be created; the
    /// current snapshot stays in place
    pub fn apply_config(&self, config: &RuntimeConfig) -> Result<(), ServerError> {
        let snapshot = RoutingSnapshot::from_config(config)?;
        self.install(snapshot);
        Ok(())
    }

    fn install(&self, snapshot: RoutingSnapshot) {
        self.limiter().apply_policies(&snapshot.token_limits);
        info!(
            routes = snapshot.route_table.len(),
            backends = snapshot.registry.len(),
            policies = snapshot.security_policies.len(),
            "Routing snapshot installed"
        );
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Apply every configuration published on the channel
    pub fn spawn_reload_listener(
        &self,
        mut updates: watch::Receiver<Arc<RuntimeConfig>>,
    ) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let config = updates.borrow_and_update().clone();
                match state.apply_config(&config) {
                    Ok(()) => state.metrics.record_config_reload(true),
                    Err(e) => {
                        error!(error = %e, "Reloaded configuration rejected");
                        state.metrics.record_config_reload(false);
                    }
                }
            }
            warn!("Configuration updates closed");
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("snapshot", &self.snapshot.load())
            .finish_non_exhaustive()
    }
}

/// Builder for application state
pub struct AppStateBuilder {
    config: RuntimeConfig,
    registry: Option<BackendRegistry>,
    clock: Option<Arc<dyn Clock>>,
    estimator: Option<Arc<dyn TokenEstimator>>,
    metrics: Option<Arc<Metrics>>,
}

impl AppStateBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            config: config.clone(),
            registry: None,
            clock: None,
            estimator: None,
            metrics: None,
        }
    }

    /// Use these backend clients instead of creating them from configuration
    #[must_use]
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the limiter clock
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the token estimator
    #[must_use]
    pub fn estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Set the metrics collector
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the state
    ///
    /// # Errors
    /// Returns error if backend clients or metrics cannot be created
    pub fn build(self) -> Result<AppState, ServerError> {
        let snapshot = match self.registry {
            Some(registry) => RoutingSnapshot::with_registry(&self.config, registry),
            None => RoutingSnapshot::from_config(&self.config)?,
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let limiter = Arc::new(TokenLimiter::with_clock(&snapshot.token_limits, clock));

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(Metrics::new().map_err(|e| ServerError::Config(e.to_string()))?),
        };

        let authenticator =
            Authenticator::new().map_err(|e| ServerError::Config(e.to_string()))?;

        let state = AppState {
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            dispatcher: Arc::new(FallbackDispatcher::new(limiter)),
            authenticator: Arc::new(authenticator),
            estimator: self
                .estimator
                .unwrap_or_else(|| Arc::new(CharTokenEstimator::default())),
            metrics,
            cors: Arc::new(self.config.cors.clone()),
            metrics_config: Arc::new(self.config.observability.metrics.clone()),
        };
        state.refresh_bucket_gauges();
        Ok(state)
    }
}
