//! Route table: ordered predicate evaluation.
//!
//! Predicates of all routes are flattened and sorted once at construction:
//! exact and prefix patterns by descending literal length (exact first on a
//! tie), then segment wildcards by descending literal length, then
//! catch-alls. Equal keys keep declaration order. Matching walks the list
//! and returns the first hit.

use crate::pattern::{PathPattern, PatternKind};
use crate::route::Route;
use crate::RouteError;
use gateway_core::GatewayError;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct Entry {
    pattern: PathPattern,
    route: usize,
}

/// Immutable, ordered set of routes
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    entries: Vec<Entry>,
}

impl RouteTable {
    /// Build a table from routes in declaration order
    ///
    /// # Errors
    /// Returns `RouteError::DuplicateRoute` if two routes share a name
    pub fn new(routes: Vec<Route>) -> Result<Self, RouteError> {
        let mut seen = HashSet::new();
        for route in &routes {
            if !seen.insert(route.name().to_string()) {
                return Err(RouteError::DuplicateRoute {
                    route: route.name().to_string(),
                });
            }
        }

        let routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        let mut entries: Vec<Entry> = routes
            .iter()
            .enumerate()
            .flat_map(|(idx, route)| {
                route.predicates().iter().map(move |pattern| Entry {
                    pattern: pattern.clone(),
                    route: idx,
                })
            })
            .collect();

        // Stable sort: ties keep route then predicate declaration order
        entries.sort_by_key(|e| specificity(&e.pattern));

        for entry in &entries {
            debug!(
                pattern = %entry.pattern,
                route = %routes[entry.route].name(),
                "Route predicate registered"
            );
        }

        Ok(Self { routes, entries })
    }

    /// Find the route for a request path
    ///
    /// # Errors
    /// Returns `GatewayError::RouteNotFound` when no predicate matches
    pub fn match_path(&self, path: &str) -> Result<Arc<Route>, GatewayError> {
        let found = self
            .entries
            .iter()
            .find(|e| e.pattern.matches(path))
            .map(|e| Arc::clone(&self.routes[e.route]));

        match found {
            Some(route) => {
                trace!(path = %path, route = %route.name(), "Route matched");
                Ok(route)
            }
            None => Err(GatewayError::route_not_found(path)),
        }
    }

    /// Routes in declaration order
    #[must_use]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Route by name
    #[must_use]
    pub fn route(&self, name: &str) -> Option<Arc<Route>> {
        self.routes.iter().find(|r| r.name() == name).cloned()
    }

    /// Whether some predicate matches every path
    #[must_use]
    pub fn has_catch_all(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.pattern.kind() == PatternKind::CatchAll)
    }

    /// `(pattern, route)` pairs in evaluation order
    #[must_use]
    pub fn evaluation_order(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| {
                (
                    e.pattern.as_str().to_string(),
                    self.routes[e.route].name().to_string(),
                )
            })
            .collect()
    }

    /// Number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn specificity(pattern: &PathPattern) -> (u8, Reverse<usize>, u8) {
    match pattern.kind() {
        PatternKind::Exact => (0, Reverse(pattern.literal_len()), 0),
        PatternKind::Prefix => (0, Reverse(pattern.literal_len()), 1),
        PatternKind::Segment => (1, Reverse(pattern.literal_len()), 0),
        PatternKind::CatchAll => (2, Reverse(0), 0),
    }
}
