//! Backend registry.
//!
//! Holds one client per configured backend, keyed by backend name. A
//! registry is built from a compiled configuration and never mutated
//! afterwards; hot reload builds a fresh one and swaps it in whole.

use crate::{AnthropicBackend, GoogleBackend, OllamaBackend, OpenAIBackend};
use gateway_config::{ProviderCredentials, RuntimeConfig};
use gateway_core::{Backend, BackendDescriptor, BackendLookup, GatewayError, ProviderKind};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of backend clients
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a client for every backend of the configuration
    ///
    /// # Errors
    /// Returns error if a client cannot be created
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, GatewayError> {
        let mut registry = Self::new();
        for descriptor in &config.backends {
            let credentials = config.credentials.get(&descriptor.provider());
            registry.register(create_backend(Arc::clone(descriptor), credentials)?)?;
        }
        info!(backends = registry.len(), "Backend registry built");
        Ok(registry)
    }

    /// Register a backend client
    ///
    /// # Errors
    /// Returns error if a backend with the same name is already registered
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Result<(), GatewayError> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(GatewayError::configuration(format!(
                "Backend '{name}' is already registered"
            )));
        }
        debug!(backend = %name, provider = %backend.kind(), "Registered backend");
        self.backends.insert(name, backend);
        Ok(())
    }

    /// Get a backend by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    /// Registered backend names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered backends
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl BackendLookup for BackendRegistry {
    fn backend(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.get(name)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

/// Create the client matching a descriptor's provider
///
/// # Errors
/// Returns error if a cloud provider has no API key or the HTTP client
/// cannot be created
pub fn create_backend(
    descriptor: Arc<BackendDescriptor>,
    credentials: Option<&ProviderCredentials>,
) -> Result<Arc<dyn Backend>, GatewayError> {
    let backend: Arc<dyn Backend> = match descriptor.provider() {
        ProviderKind::Ollama => Arc::new(OllamaBackend::new(descriptor)?),
        ProviderKind::OpenAI => {
            let key = api_key(&descriptor, credentials)?;
            Arc::new(OpenAIBackend::new(descriptor, key)?)
        }
        ProviderKind::Anthropic => {
            let key = api_key(&descriptor, credentials)?;
            Arc::new(AnthropicBackend::new(descriptor, key)?)
        }
        ProviderKind::Google => {
            let key = api_key(&descriptor, credentials)?;
            Arc::new(GoogleBackend::new(descriptor, key)?)
        }
    };
    Ok(backend)
}

fn api_key(
    descriptor: &BackendDescriptor,
    credentials: Option<&ProviderCredentials>,
) -> Result<SecretString, GatewayError> {
    credentials
        .and_then(|c| c.api_key.clone())
        .ok_or_else(|| {
            GatewayError::configuration(format!(
                "Backend '{}' needs an api_key for provider '{}'",
                descriptor.name,
                descriptor.provider()
            ))
        })
}
