//! # Gateway Routing
//!
//! Path-based routing for the AI traffic gateway.
//!
//! This crate provides:
//! - Path patterns (exact, prefix, segment wildcard, catch-all)
//! - Routes binding patterns to an ordered fallback chain of backends
//! - A route table evaluating patterns in specificity order

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod pattern;
pub mod route;
pub mod table;

use thiserror::Error;

// Re-export main types
pub use pattern::{PathPattern, PatternKind};
pub use route::Route;
pub use table::RouteTable;

/// Errors raised while building routes and route tables
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Path pattern does not follow the grammar
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// Route declares no path
    #[error("Route '{route}' has no paths")]
    NoPaths {
        /// Route name
        route: String,
    },

    /// Route declares no backend
    #[error("Route '{route}' has no backends")]
    NoBackends {
        /// Route name
        route: String,
    },

    /// Two routes share a name
    #[error("Duplicate route name '{route}'")]
    DuplicateRoute {
        /// Route name
        route: String,
    },
}
