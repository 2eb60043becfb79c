//! Route, filter and handler registrations.
//!
//! # Responsibilities
//! - Hold routes keyed by (method, translated pattern)
//! - Hold before/after filters in registration order
//! - Hold exception handlers and the 404/500 handlers
//! - Answer the dispatcher's per-request lookups
//!
//! # Design Decisions
//! - Patterns are translated and compiled at registration; a bad pattern is
//!   rejected there, never at dispatch
//! - Re-registering the same (method, translated path) replaces the handler
//!   in place (last registration wins, first position kept)
//! - Among distinct patterns matching one request, the earliest registered
//!   route wins
//! - The registry is a plain value; the lifecycle publishes immutable
//!   snapshots of it to the dispatcher

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::dispatch::handler::{ErrorKind, ExceptionFn, FilterFn, RouteFn};
use crate::error::BridgeResult;
use crate::routing::matcher::{PathMatch, PathPattern};
use crate::routing::path::translate;

/// Which side of the route a filter runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterPhase {
    Before,
    After,
}

impl fmt::Display for FilterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPhase::Before => f.write_str("before"),
            FilterPhase::After => f.write_str("after"),
        }
    }
}

/// One registered route.
#[derive(Clone)]
pub struct RouteEntry {
    pub(crate) method: Method,
    pub(crate) pattern: PathPattern,
    pub(crate) original: String,
    pub(crate) handler: Arc<RouteFn>,
}

impl RouteEntry {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Pattern in engine syntax.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Pattern as it was registered.
    pub fn original_pattern(&self) -> &str {
        &self.original
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("original", &self.original)
            .finish()
    }
}

/// One registered filter.
#[derive(Clone)]
pub struct FilterEntry {
    pub(crate) phase: FilterPhase,
    pub(crate) pattern: PathPattern,
    pub(crate) handler: Arc<FilterFn>,
}

impl FilterEntry {
    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("phase", &self.phase)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// One registered exception handler.
#[derive(Clone)]
pub struct ExceptionHandlerEntry {
    pub(crate) kind: ErrorKind,
    pub(crate) handler: Arc<ExceptionFn>,
}

impl ExceptionHandlerEntry {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Debug for ExceptionHandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandlerEntry")
            .field("kind", &self.kind)
            .finish()
    }
}

/// A route lookup hit.
pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    pub captured: PathMatch,
}

/// All registrations known to one bridge.
#[derive(Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<RouteEntry>,
    before: Vec<FilterEntry>,
    after: Vec<FilterEntry>,
    exception_handlers: Vec<ExceptionHandlerEntry>,
    not_found: Option<Arc<RouteFn>>,
    internal_error: Option<Arc<RouteFn>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route under a legacy pattern.
    pub(crate) fn add_route(
        &mut self,
        method: Method,
        path: &str,
        handler: Arc<RouteFn>,
    ) -> BridgeResult<()> {
        let pattern = PathPattern::parse(&translate(path))?;

        if let Some(existing) = self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            tracing::warn!(
                method = %method,
                pattern = %pattern,
                "Route registered twice; keeping the latest handler"
            );
            existing.original = path.to_string();
            existing.handler = handler;
            return Ok(());
        }

        tracing::debug!(method = %method, pattern = %pattern, original = path, "Route registered");
        self.routes.push(RouteEntry {
            method,
            pattern,
            original: path.to_string(),
            handler,
        });
        Ok(())
    }

    pub(crate) fn add_filter(
        &mut self,
        phase: FilterPhase,
        path: &str,
        handler: Arc<FilterFn>,
    ) -> BridgeResult<()> {
        let pattern = PathPattern::parse(&translate(path))?;
        tracing::debug!(phase = %phase, pattern = %pattern, "Filter registered");

        let entry = FilterEntry {
            phase,
            pattern,
            handler,
        };
        match phase {
            FilterPhase::Before => self.before.push(entry),
            FilterPhase::After => self.after.push(entry),
        }
        Ok(())
    }

    pub(crate) fn add_exception_handler(&mut self, kind: ErrorKind, handler: Arc<ExceptionFn>) {
        match self
            .exception_handlers
            .iter_mut()
            .find(|entry| entry.kind == kind)
        {
            Some(existing) => existing.handler = handler,
            None => self
                .exception_handlers
                .push(ExceptionHandlerEntry { kind, handler }),
        }
        tracing::debug!(kind = kind.name(), "Exception handler registered");
    }

    pub(crate) fn set_not_found(&mut self, handler: Arc<RouteFn>) {
        self.not_found = Some(handler);
    }

    pub(crate) fn set_internal_error(&mut self, handler: Arc<RouteFn>) {
        self.internal_error = Some(handler);
    }

    /// First registered route whose method and pattern match.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|entry| entry.method == *method)
            .find_map(|entry| {
                entry
                    .pattern
                    .matches(path)
                    .map(|captured| RouteMatch { entry, captured })
            })
    }

    /// Every filter of `phase` matching `path`, in registration order.
    pub fn match_filters(&self, phase: FilterPhase, path: &str) -> Vec<(&FilterEntry, PathMatch)> {
        let filters = match phase {
            FilterPhase::Before => &self.before,
            FilterPhase::After => &self.after,
        };
        filters
            .iter()
            .filter_map(|entry| entry.pattern.matches(path).map(|captured| (entry, captured)))
            .collect()
    }

    /// Handler for the most specific registered kind `error` satisfies.
    ///
    /// Walks `error` and its `source()` chain from the outside in; the first
    /// link any registered kind matches decides. Returns that link alongside
    /// the handler, since it is the value the handler downcasts.
    pub fn match_exception_handler<'e>(
        &self,
        error: &'e (dyn Error + 'static),
    ) -> Option<(&ExceptionHandlerEntry, &'e (dyn Error + 'static))> {
        let mut current = Some(error);
        while let Some(link) = current {
            if let Some(entry) = self
                .exception_handlers
                .iter()
                .find(|entry| entry.kind.is_instance(link))
            {
                return Some((entry, link));
            }
            current = link.source();
        }
        None
    }

    pub(crate) fn not_found(&self) -> Option<&Arc<RouteFn>> {
        self.not_found.as_ref()
    }

    pub(crate) fn internal_error(&self) -> Option<&Arc<RouteFn>> {
        self.internal_error.as_ref()
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn filters(&self, phase: FilterPhase) -> &[FilterEntry] {
        match phase {
            FilterPhase::Before => &self.before,
            FilterPhase::After => &self.after,
        }
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandlerEntry] {
        &self.exception_handlers
    }
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.routes)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("exception_handlers", &self.exception_handlers)
            .field("not_found", &self.not_found.is_some())
            .field("internal_error", &self.internal_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler::{exception_fn, filter_fn, route_fn, HandlerError};
    use crate::http::{Request, Response};

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped")]
    struct Wrapped(#[source] std::num::ParseIntError);

    fn body(text: &'static str) -> Arc<RouteFn> {
        route_fn(move |_: &mut Request, _: &mut Response| Ok::<_, HandlerError>(text))
    }

    fn call(entry: &RouteEntry) -> Option<String> {
        let mut req: Request = axum::http::Request::new(axum::body::Bytes::new()).into();
        let mut res = Response::new();
        (entry.handler)(&mut req, &mut res).unwrap()
    }

    fn noop() -> Arc<FilterFn> {
        filter_fn(|_: &mut Request, _: &mut Response| Ok(()))
    }

    #[test]
    fn routes_are_translated_and_matched_by_method() {
        let mut registry = RouteRegistry::new();
        registry.add_route(Method::GET, "/users/:id", body("get")).unwrap();
        registry.add_route(Method::POST, "/users", body("post")).unwrap();

        let hit = registry.match_route(&Method::GET, "/users/7").unwrap();
        assert_eq!(hit.entry.pattern(), "/users/{id}");
        assert_eq!(hit.entry.original_pattern(), "/users/:id");
        assert_eq!(hit.captured.params["id"], "7");

        assert!(registry.match_route(&Method::POST, "/users/7").is_none());
        assert!(registry.match_route(&Method::POST, "/users").is_some());
    }

    #[test]
    fn duplicate_route_keeps_latest_handler() {
        let mut registry = RouteRegistry::new();
        registry.add_route(Method::GET, "/a/:x", body("first")).unwrap();
        registry.add_route(Method::GET, "/b", body("other")).unwrap();
        registry.add_route(Method::GET, "/a/:x", body("second")).unwrap();

        assert_eq!(registry.routes().len(), 2);
        let hit = registry.match_route(&Method::GET, "/a/1").unwrap();
        assert_eq!(call(hit.entry).as_deref(), Some("second"));
        assert_eq!(registry.routes()[0].pattern(), "/a/{x}");
    }

    #[test]
    fn earliest_overlapping_route_wins() {
        let mut registry = RouteRegistry::new();
        registry.add_route(Method::GET, "/files/:name", body("param")).unwrap();
        registry.add_route(Method::GET, "/files/readme", body("literal")).unwrap();

        let hit = registry.match_route(&Method::GET, "/files/readme").unwrap();
        assert_eq!(call(hit.entry).as_deref(), Some("param"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut registry = RouteRegistry::new();
        assert!(registry.add_route(Method::GET, "no-slash", body("x")).is_err());
        assert!(registry.add_filter(FilterPhase::Before, "/*/x", noop()).is_err());
        assert!(registry.routes().is_empty());
    }

    #[test]
    fn every_matching_filter_in_order() {
        let mut registry = RouteRegistry::new();
        registry.add_filter(FilterPhase::Before, "/*", noop()).unwrap();
        registry.add_filter(FilterPhase::Before, "/a/*", noop()).unwrap();
        registry.add_filter(FilterPhase::After, "/*", noop()).unwrap();

        let hits: Vec<_> = registry
            .match_filters(FilterPhase::Before, "/a/b")
            .into_iter()
            .map(|(entry, _)| entry.pattern().to_string())
            .collect();
        assert_eq!(hits, vec!["/*", "/a/*"]);

        assert_eq!(registry.match_filters(FilterPhase::Before, "/c").len(), 1);
        assert_eq!(registry.match_filters(FilterPhase::After, "/c").len(), 1);
    }

    #[test]
    fn shallowest_matching_kind_wins() {
        let mut registry = RouteRegistry::new();
        registry.add_exception_handler(
            ErrorKind::of::<std::num::ParseIntError>(),
            exception_fn(|_: &std::num::ParseIntError, _: &mut Request, _: &mut Response| {}),
        );
        registry.add_exception_handler(
            ErrorKind::of::<Wrapped>(),
            exception_fn(|_: &Wrapped, _: &mut Request, _: &mut Response| {}),
        );

        let inner = "x".parse::<u8>().unwrap_err();
        let wrapped = Wrapped(inner.clone());

        let (entry, link) = registry.match_exception_handler(&wrapped).unwrap();
        assert_eq!(entry.kind(), ErrorKind::of::<Wrapped>());
        assert!(link.is::<Wrapped>());

        let (entry, _) = registry.match_exception_handler(&inner).unwrap();
        assert_eq!(entry.kind(), ErrorKind::of::<std::num::ParseIntError>());
    }

    #[test]
    fn source_chain_is_searched() {
        let mut registry = RouteRegistry::new();
        registry.add_exception_handler(
            ErrorKind::of::<std::num::ParseIntError>(),
            exception_fn(|_: &std::num::ParseIntError, _: &mut Request, _: &mut Response| {}),
        );
        let wrapped = Wrapped("x".parse::<u8>().unwrap_err());

        let (_, link) = registry.match_exception_handler(&wrapped).unwrap();
        assert!(link.is::<std::num::ParseIntError>());

        let unrelated = std::io::Error::other("io");
        assert!(registry.match_exception_handler(&unrelated).is_none());
    }

    #[test]
    fn re_registering_a_kind_replaces_it() {
        let mut registry = RouteRegistry::new();
        let kind = ErrorKind::of::<std::io::Error>();
        let ignore = || exception_fn(|_: &std::io::Error, _: &mut Request, _: &mut Response| {});
        registry.add_exception_handler(kind, ignore());
        registry.add_exception_handler(kind, ignore());
        assert_eq!(registry.exception_handlers().len(), 1);
    }
}
