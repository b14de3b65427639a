//! Path pattern grammar and matching.
//!
//! A pattern is a leading `/` followed by segments. A segment is either a
//! literal or a lone `*`:
//! - no `*` at all is an exact match (`/v1/investment`);
//! - a single trailing `*` is a prefix match (`/v1/*` matches `/v1` and
//!   everything below it);
//! - a `*` in a non-final position matches exactly one segment
//!   (`/v1/*/chat`), optionally followed by a trailing `/*`;
//! - `/*` (or a bare `*`) matches every path.

use crate::RouteError;
use std::fmt;

/// Pattern class, in the order classes are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternKind {
    /// Literal path
    Exact,
    /// Literal prefix followed by `/*`
    Prefix,
    /// Contains a single-segment wildcard
    Segment,
    /// Matches everything
    CatchAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

/// A parsed path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    kind: PatternKind,
    segments: Vec<Segment>,
    open_ended: bool,
    literal_len: usize,
}

impl PathPattern {
    /// Parse a pattern
    ///
    /// # Errors
    /// Returns `RouteError::InvalidPattern` when the pattern does not start
    /// with `/`, contains an empty segment, or uses `*` inside a segment
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = pattern.trim();
        if trimmed == "*" || trimmed == "/*" {
            return Ok(Self {
                raw: trimmed.to_string(),
                kind: PatternKind::CatchAll,
                segments: Vec::new(),
                open_ended: true,
                literal_len: 0,
            });
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                match part {
                    "" => return Err(invalid("empty path segment")),
                    "*" => segments.push(Segment::Any),
                    p if p.contains('*') => {
                        return Err(invalid("'*' must occupy a whole segment"));
                    }
                    p => segments.push(Segment::Literal(p.to_string())),
                }
            }
        }

        let open_ended = matches!(segments.last(), Some(Segment::Any));
        if open_ended {
            segments.pop();
        }
        let has_inner_wildcard = segments.iter().any(|s| *s == Segment::Any);

        let kind = match (has_inner_wildcard, open_ended) {
            (true, _) => PatternKind::Segment,
            (false, true) => PatternKind::Prefix,
            (false, false) => PatternKind::Exact,
        };

        let literal_len = segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(l) => Some(l.len() + 1),
                Segment::Any => None,
            })
            .sum();

        Ok(Self {
            raw: trimmed.to_string(),
            kind,
            segments,
            open_ended,
            literal_len,
        })
    }

    /// Pattern class
    #[must_use]
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Length of the literal text before the first wildcard
    #[must_use]
    pub fn literal_len(&self) -> usize {
        self.literal_len
    }

    /// Pattern as written in configuration
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether a request path matches this pattern
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        if self.kind == PatternKind::CatchAll {
            return true;
        }

        let segments = split_path(path);
        if self.open_ended {
            if segments.len() < self.segments.len() {
                return false;
            }
        } else if segments.len() != self.segments.len() {
            return false;
        }

        self.segments
            .iter()
            .zip(&segments)
            .all(|(pattern, actual)| match pattern {
                Segment::Literal(l) => l == actual,
                Segment::Any => !actual.is_empty(),
            })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a request path into segments, ignoring a trailing slash
fn split_path(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}
