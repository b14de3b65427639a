//! Routes: a named set of path predicates bound to a fallback chain.

use crate::pattern::PathPattern;
use crate::RouteError;
use gateway_core::{BackendDescriptor, ProviderKind};
use std::sync::Arc;

/// A route
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    predicates: Vec<PathPattern>,
    backends: Vec<Arc<BackendDescriptor>>,
    security_policy: Option<String>,
    allowed_models: Vec<String>,
}

impl Route {
    /// Build a route; backends are ordered by ascending priority, ties
    /// keeping declaration order
    ///
    /// # Errors
    /// Returns an error when there are no paths, no backends, or a path is
    /// not a valid pattern
    pub fn new<P, I>(
        name: impl Into<String>,
        paths: P,
        backends: I,
    ) -> Result<Self, RouteError>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        I: IntoIterator<Item = Arc<BackendDescriptor>>,
    {
        let name = name.into();

        let predicates = paths
            .into_iter()
            .map(|p| PathPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if predicates.is_empty() {
            return Err(RouteError::NoPaths { route: name });
        }

        let mut backends: Vec<_> = backends.into_iter().collect();
        if backends.is_empty() {
            return Err(RouteError::NoBackends { route: name });
        }
        backends.sort_by_key(|b| b.priority);

        Ok(Self {
            name,
            predicates,
            backends,
            security_policy: None,
            allowed_models: Vec::new(),
        })
    }

    /// Attach a named security policy
    #[must_use]
    pub fn with_security_policy(mut self, policy: impl Into<String>) -> Self {
        self.security_policy = Some(policy.into());
        self
    }

    /// Let clients pick one of these models for the route's Ollama backends
    #[must_use]
    pub fn with_allowed_models<I>(mut self, models: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Route name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path predicates, in declaration order
    #[must_use]
    pub fn predicates(&self) -> &[PathPattern] {
        &self.predicates
    }

    /// Backends in fallback order
    #[must_use]
    pub fn backends(&self) -> &[Arc<BackendDescriptor>] {
        &self.backends
    }

    /// First backend of the chain
    #[must_use]
    pub fn primary(&self) -> &BackendDescriptor {
        // Construction guarantees at least one backend
        &self.backends[0]
    }

    /// Models clients may select per request
    #[must_use]
    pub fn allowed_models(&self) -> &[String] {
        &self.allowed_models
    }

    /// Model a backend of this route is called with
    ///
    /// The client's pick replaces the configured model only for Ollama
    /// backends, and only when the route lists it.
    #[must_use]
    pub fn model_for<'a>(
        &'a self,
        backend: &'a BackendDescriptor,
        requested: Option<&'a str>,
    ) -> &'a str {
        match requested {
            Some(model)
                if backend.provider() == ProviderKind::Ollama
                    && self.allowed_models.iter().any(|m| m == model) =>
            {
                model
            }
            _ => &backend.model,
        }
    }

    /// Security policy name, if the route is protected
    #[must_use]
    pub fn security_policy(&self) -> Option<&str> {
        self.security_policy.as_deref()
    }
}
