//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile engine-syntax patterns (`/users/{id}/*`) into segments
//! - Match request paths: exact literals, single-segment `{param}` capture,
//!   trailing `*` capturing any suffix (including an empty one)
//!
//! # Design Decisions
//! - Compiled once at registration; matching never re-parses the pattern
//! - Leading, trailing and repeated slashes are not significant
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching

use std::collections::HashMap;

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A compiled path pattern in the engine's native syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

/// Values captured by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    /// `{name}` captures, percent-decoded.
    pub params: HashMap<String, String>,
    /// Suffix captured by a trailing `*`.
    pub splat: Vec<String>,
}

impl PathPattern {
    /// Compile a native pattern.
    pub fn parse(pattern: &str) -> BridgeResult<Self> {
        if !pattern.starts_with('/') {
            return Err(BridgeError::invalid_pattern(pattern, "must start with '/'"));
        }

        let pieces: Vec<&str> = split_path(pattern).collect();
        let mut segments = Vec::with_capacity(pieces.len());

        for (index, piece) in pieces.iter().enumerate() {
            let segment = if *piece == "*" {
                if index + 1 != pieces.len() {
                    return Err(BridgeError::invalid_pattern(
                        pattern,
                        "'*' is only allowed as the final segment",
                    ));
                }
                Segment::Wildcard
            } else if let Some(name) = piece.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(BridgeError::invalid_pattern(pattern, "empty parameter name"));
                }
                if name.contains(['{', '}']) {
                    return Err(BridgeError::invalid_pattern(pattern, "nested braces"));
                }
                Segment::Param(name.to_string())
            } else if piece.contains(['{', '}']) {
                return Err(BridgeError::invalid_pattern(pattern, "unbalanced braces"));
            } else {
                Segment::Literal(piece.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the `{param}` segments, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Match a request path, returning the captures on success.
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let mut pieces = split_path(path);
        let mut captured = PathMatch::default();

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => {
                    let rest: Vec<&str> = pieces.by_ref().collect();
                    if !rest.is_empty() {
                        captured.splat.push(rest.join("/"));
                    }
                    return Some(captured);
                }
                Segment::Literal(expected) => {
                    if pieces.next()? != expected {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = pieces.next()?;
                    captured.params.insert(name.clone(), decode(value));
                }
            }
        }

        if pieces.next().is_some() {
            return None;
        }
        Some(captured)
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|piece| !piece.is_empty())
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
