//! Compilation of a parsed configuration into the typed runtime model.
//!
//! Everything the gateway needs at request time is built here once: the
//! route table with its immutable backend descriptors, per-provider token
//! policies and credentials, and the JWT policies routes refer to. A
//! document that compiles is guaranteed to be internally consistent.

use crate::loader::ConfigError;
use crate::schema::{
    BackendConfig, CorsConfig, GatewayConfig, ListenerConfig, ObservabilityConfig,
    SecurityPolicyConfig,
};
use gateway_core::{
    BackendDescriptor, BackendTarget, GenerationParams, MaxTokens, ProviderKind, Temperature,
    TokenLimitPolicy,
};
use gateway_routing::{Route, RouteTable};
use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Credentials and endpoint defaults of a provider
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    /// API key
    pub api_key: Option<SecretString>,
    /// Base URL override
    pub base_url: Option<Url>,
}

/// Where a security policy gets its verification keys
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Remote JWKS document
    Jwks {
        /// Document URL
        uri: Url,
        /// Fetch timeout
        fetch_timeout: Duration,
        /// Cache lifetime
        cache_duration: Duration,
    },
    /// Shared HMAC secret
    Secret(SecretString),
}

/// Compiled JWT validation policy
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Policy name
    pub name: String,
    /// Expected issuer
    pub issuer: Option<String>,
    /// Accepted audiences (any match)
    pub audiences: Vec<String>,
    /// Key source
    pub key_source: KeySource,
    /// Accepted algorithms
    pub algorithms: Vec<Algorithm>,
    /// Clock skew tolerance
    pub leeway: Duration,
}

/// Validated, typed configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Listeners
    pub listeners: Vec<ListenerConfig>,
    /// Route table
    pub route_table: RouteTable,
    /// Every backend descriptor, in declaration order
    pub backends: Vec<Arc<BackendDescriptor>>,
    /// Token policies by provider
    pub token_limits: HashMap<ProviderKind, TokenLimitPolicy>,
    /// Credentials by provider
    pub credentials: HashMap<ProviderKind, ProviderCredentials>,
    /// Security policies by name
    pub security_policies: HashMap<String, Arc<SecurityPolicy>>,
    /// CORS settings
    pub cors: CorsConfig,
    /// Logging and metrics settings
    pub observability: ObservabilityConfig,
}

impl RuntimeConfig {
    /// Validate and compile a configuration document
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` listing every problem found
    pub fn compile(config: &GatewayConfig) -> Result<Self, ConfigError> {
        config
            .validate_config()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        let mut problems = Problems::default();

        if config.listeners.is_empty() {
            problems.push("at least one listener is required");
        }

        let token_limits = compile_token_limits(config, &mut problems);
        let credentials: HashMap<_, _> = config
            .providers
            .iter()
            .map(|(kind, provider)| {
                (
                    *kind,
                    ProviderCredentials {
                        api_key: provider.api_key.clone(),
                        base_url: provider.base_url.clone(),
                    },
                )
            })
            .collect();
        let security_policies = compile_security_policies(config, &mut problems);

        let mut backend_names = HashSet::new();
        let mut backends = Vec::new();
        let mut routes = Vec::new();

        for route in &config.routes {
            if let Some(policy) = &route.security {
                if !security_policies.contains_key(policy) {
                    problems.push(format!(
                        "route '{}' refers to undefined security policy '{policy}'",
                        route.name
                    ));
                }
            }

            if !route.allowed_models.is_empty() {
                if route.allowed_models.iter().any(|m| m.trim().is_empty()) {
                    problems.push(format!(
                        "route '{}': allowed_models entries must not be empty",
                        route.name
                    ));
                }
                if !route
                    .backends
                    .iter()
                    .any(|b| b.provider == ProviderKind::Ollama)
                {
                    problems.push(format!(
                        "route '{}' lists allowed_models but has no ollama backend",
                        route.name
                    ));
                }
            }

            let mut descriptors = Vec::with_capacity(route.backends.len());
            for backend in &route.backends {
                if !backend_names.insert(backend.name.clone()) {
                    problems.push(format!("duplicate backend name '{}'", backend.name));
                }
                if let Some(descriptor) =
                    compile_backend(backend, config, &token_limits, &mut problems)
                {
                    let descriptor = Arc::new(descriptor);
                    backends.push(Arc::clone(&descriptor));
                    descriptors.push(descriptor);
                }
            }

            // Skip route construction when a backend was already rejected
            if descriptors.len() != route.backends.len() {
                continue;
            }
            match Route::new(&route.name, &route.paths, descriptors) {
                Ok(compiled) => {
                    let compiled = match &route.security {
                        Some(policy) => compiled.with_security_policy(policy),
                        None => compiled,
                    };
                    routes.push(compiled.with_allowed_models(&route.allowed_models));
                }
                Err(e) => problems.push(e.to_string()),
            }
        }

        problems.into_result()?;

        let route_table =
            RouteTable::new(routes).map_err(|e| ConfigError::Validation(e.to_string()))?;

        info!(
            routes = route_table.len(),
            backends = backends.len(),
            providers = token_limits.len(),
            catch_all = route_table.has_catch_all(),
            "Configuration compiled"
        );

        Ok(Self {
            listeners: config.listeners.clone(),
            route_table,
            backends,
            token_limits,
            credentials,
            security_policies,
            cors: config.security.cors.clone(),
            observability: config.observability.clone(),
        })
    }

    /// Descriptor by backend name
    #[must_use]
    pub fn backend(&self, name: &str) -> Option<&Arc<BackendDescriptor>> {
        self.backends.iter().find(|b| b.name == name)
    }
}

#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn push(&mut self, problem: impl Into<String>) {
        self.0.push(problem.into());
    }

    fn into_result(self) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self.0.join("; ")))
        }
    }
}

fn compile_token_limits(
    config: &GatewayConfig,
    problems: &mut Problems,
) -> HashMap<ProviderKind, TokenLimitPolicy> {
    let mut limits = HashMap::new();
    for (kind, provider) in &config.providers {
        let policy = TokenLimitPolicy::new(
            provider.rate_limit.input_tokens_per_second,
            provider.rate_limit.output_tokens_per_second,
        );
        if policy.is_valid() {
            limits.insert(*kind, policy);
        } else {
            problems.push(format!(
                "provider '{kind}' token rates must be positive (input {}, output {})",
                policy.input_tokens_per_second, policy.output_tokens_per_second
            ));
        }
    }
    limits
}

fn compile_security_policies(
    config: &GatewayConfig,
    problems: &mut Problems,
) -> HashMap<String, Arc<SecurityPolicy>> {
    config
        .security
        .policies
        .iter()
        .filter_map(|(name, policy)| {
            compile_security_policy(name, policy, problems).map(|p| (name.clone(), Arc::new(p)))
        })
        .collect()
}

fn compile_security_policy(
    name: &str,
    policy: &SecurityPolicyConfig,
    problems: &mut Problems,
) -> Option<SecurityPolicy> {
    let key_source = match (&policy.jwks_uri, &policy.secret) {
        (Some(uri), None) => KeySource::Jwks {
            uri: uri.clone(),
            fetch_timeout: policy.jwks_fetch_timeout,
            cache_duration: policy.jwks_cache_duration,
        },
        (None, Some(secret)) if !secret.expose_secret().is_empty() => {
            KeySource::Secret(secret.clone())
        }
        (Some(_), Some(_)) => {
            problems.push(format!(
                "security policy '{name}' must set only one of jwks_uri or secret"
            ));
            return None;
        }
        _ => {
            problems.push(format!(
                "security policy '{name}' needs a jwks_uri or a secret"
            ));
            return None;
        }
    };

    let algorithms = if policy.algorithms.is_empty() {
        match key_source {
            KeySource::Jwks { .. } => vec![Algorithm::RS256],
            KeySource::Secret(_) => vec![Algorithm::HS256],
        }
    } else {
        policy.algorithms.clone()
    };

    Some(SecurityPolicy {
        name: name.to_string(),
        issuer: policy.issuer.clone(),
        audiences: policy.audiences.clone(),
        key_source,
        algorithms,
        leeway: policy.leeway,
    })
}

fn compile_backend(
    backend: &BackendConfig,
    config: &GatewayConfig,
    token_limits: &HashMap<ProviderKind, TokenLimitPolicy>,
    problems: &mut Problems,
) -> Option<BackendDescriptor> {
    let name = &backend.name;
    let kind = backend.provider;
    let before = problems.0.len();

    let provider = config.providers.get(&kind);
    if provider.is_none() {
        problems.push(format!(
            "backend '{name}' uses provider '{kind}' which has no rate_limit policy"
        ));
    }

    let temperature = Temperature::new(backend.temperature)
        .map_err(|e| problems.push(format!("backend '{name}': {e}")))
        .ok();
    let max_tokens = MaxTokens::new(backend.max_tokens)
        .map_err(|e| problems.push(format!("backend '{name}': {e}")))
        .ok();

    if backend.priority == 0 {
        problems.push(format!("backend '{name}': priority must be at least 1"));
    }
    if backend.timeout.is_zero() {
        problems.push(format!("backend '{name}': timeout must be positive"));
    }

    if let (Some(max), Some(policy)) = (max_tokens, token_limits.get(&kind)) {
        if f64::from(max.value()) > policy.output_tokens_per_second {
            problems.push(format!(
                "backend '{name}': max_tokens {} exceeds provider '{kind}' output rate {} and could never be admitted",
                max.value(),
                policy.output_tokens_per_second
            ));
        }
    }

    let base_url = backend
        .endpoint
        .clone()
        .or_else(|| provider.and_then(|p| p.base_url.clone()));

    let target = match kind {
        ProviderKind::Ollama => match backend.endpoint.clone() {
            Some(endpoint) => Some(BackendTarget::Ollama { endpoint }),
            None => {
                problems.push(format!("ollama backend '{name}' requires an endpoint"));
                None
            }
        },
        cloud => {
            let has_key = provider
                .and_then(|p| p.api_key.as_ref())
                .is_some_and(|k| !k.expose_secret().trim().is_empty());
            if provider.is_some() && !has_key {
                problems.push(format!(
                    "backend '{name}' uses provider '{cloud}' which has no api_key"
                ));
            }
            Some(match cloud {
                ProviderKind::OpenAI => BackendTarget::OpenAI { base_url },
                ProviderKind::Anthropic => BackendTarget::Anthropic { base_url },
                _ => BackendTarget::Google { base_url },
            })
        }
    };

    if problems.0.len() != before {
        return None;
    }

    let (Some(target), Some(temperature), Some(max_output_tokens)) =
        (target, temperature, max_tokens)
    else {
        return None;
    };

    Some(
        BackendDescriptor::new(
            name.clone(),
            target,
            backend.model.clone(),
            GenerationParams {
                temperature,
                max_output_tokens,
            },
        )
        .with_priority(backend.priority)
        .with_timeout(backend.timeout),
    )
}
