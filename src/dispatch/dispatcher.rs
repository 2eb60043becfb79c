//! Per-request dispatch.
//!
//! # State Machine
//! ```text
//! Idle → FiltersBefore → Routing → FiltersAfter → Complete
//!           │               │           │
//!           └───────────────┴───────────┴──→ ErrorPath → Complete
//!
//! Routing with no route:
//!     static file hit → FiltersAfter
//!     otherwise       → not-found handler (404) → Complete
//! ```
//!
//! # Design Decisions
//! - Runs synchronously on a blocking-pool thread; no state survives the call
//!   except what handlers write into the session store
//! - Panics in application code are caught here and become `HandlerPanic`
//! - Nothing raised by application code escapes: an unmatched failure
//!   always produces a 500
//! - A route result never replaces the body after a redirect

use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::handler::{HandlerError, HandlerPanic, RouteFn, RouteResult};
use crate::http::response::ResponseCookie;
use crate::http::static_files::StaticFiles;
use crate::http::{Request, Response};
use crate::observability::metrics;
use crate::routing::{FilterPhase, RouteRegistry};

const DEFAULT_NOT_FOUND_BODY: &str = "Not found";
const DEFAULT_INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Dispatch stage, reported in failure logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FiltersBefore,
    Routing,
    FiltersAfter,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::FiltersBefore => f.write_str("before-filters"),
            Stage::Routing => f.write_str("routing"),
            Stage::FiltersAfter => f.write_str("after-filters"),
        }
    }
}

struct Failure {
    stage: Stage,
    error: HandlerError,
}

/// Runs one request through the registered filters, routes and handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
    static_files: Option<StaticFiles>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RouteRegistry>, static_files: Option<StaticFiles>) -> Self {
        Self {
            registry,
            static_files,
        }
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Dispatch `request`, returning the finished response view.
    pub fn dispatch(&self, mut request: Request) -> Response {
        let start = Instant::now();
        let mut response = Response::new();

        if let Err(failure) = self.run(&mut request, &mut response) {
            self.handle_failure(failure, &mut request, &mut response);
        }

        if let Some((cookie_name, session_id)) = request.take_created_session() {
            let cookie = ResponseCookie::new(cookie_name, session_id)
                .path("/")
                .http_only(true);
            if let Err(error) = response.set_cookie(cookie) {
                tracing::warn!(error = %error, "Failed to emit session cookie");
            }
        }

        metrics::record_dispatch(request.request_method(), response.status(), start);
        response
    }

    fn run(&self, request: &mut Request, response: &mut Response) -> Result<(), Failure> {
        let path = request.path_info().to_string();

        for (filter, captured) in self.registry.match_filters(FilterPhase::Before, &path) {
            request.set_path_match(captured);
            invoke(|| (filter.handler)(request, response)).map_err(|error| Failure {
                stage: Stage::FiltersBefore,
                error,
            })?;
        }

        let method = request.method().clone();
        match self.registry.match_route(&method, &path) {
            Some(hit) => {
                tracing::debug!(method = %method, pattern = hit.entry.pattern(), "Route matched");
                request.set_path_match(hit.captured);
                let body = invoke(|| (hit.entry.handler)(request, response)).map_err(|error| {
                    Failure {
                        stage: Stage::Routing,
                        error,
                    }
                })?;
                if let Some(body) = body {
                    if !response.is_redirected() {
                        response.set_body(body);
                    }
                }
            }
            None => {
                if !self.serve_static(request, response) {
                    return self.not_found(request, response);
                }
            }
        }

        self.run_after_filters(&path, request, response)
    }

    fn run_after_filters(
        &self,
        path: &str,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), Failure> {
        for (filter, captured) in self.registry.match_filters(FilterPhase::After, path) {
            request.set_path_match(captured);
            invoke(|| (filter.handler)(request, response)).map_err(|error| Failure {
                stage: Stage::FiltersAfter,
                error,
            })?;
        }
        Ok(())
    }

    fn serve_static(&self, request: &Request, response: &mut Response) -> bool {
        let Some(static_files) = &self.static_files else {
            return false;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Static files configured but no runtime available");
            return false;
        };

        let hit = runtime.block_on(static_files.serve(
            request.method(),
            &request_uri(request),
            request.header_map(),
        ));
        let Some(hit) = hit else {
            return false;
        };

        response.set_status(hit.status.as_u16());
        for (name, value) in &hit.headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            if let Err(error) = response.set_header(name.as_str(), value) {
                tracing::debug!(header = %name, error = %error, "Dropped static file header");
            }
        }
        response.set_body_bytes(hit.body);
        true
    }

    fn not_found(&self, request: &mut Request, response: &mut Response) -> Result<(), Failure> {
        tracing::debug!(
            method = request.request_method(),
            path = request.path_info(),
            "No route matched"
        );
        response.set_status(404);
        match self.registry.not_found() {
            Some(handler) => {
                let body = invoke_route(handler, request, response).map_err(|error| Failure {
                    stage: Stage::Routing,
                    error,
                })?;
                if let Some(body) = body {
                    response.set_body(body);
                }
            }
            None => response.set_body(DEFAULT_NOT_FOUND_BODY),
        }
        Ok(())
    }

    fn handle_failure(&self, failure: Failure, request: &mut Request, response: &mut Response) {
        let Failure { stage, error } = failure;
        let error: &(dyn Error + 'static) = &*error;

        if let Some((entry, link)) = self.registry.match_exception_handler(error) {
            tracing::debug!(
                stage = %stage,
                kind = entry.kind().name(),
                "Exception handler matched"
            );
            let handled =
                catch_unwind(AssertUnwindSafe(|| (entry.handler)(link, request, response)));
            if handled.is_ok() {
                if stage != Stage::FiltersAfter {
                    let path = request.path_info().to_string();
                    if let Err(failure) = self.run_after_filters(&path, request, response) {
                        self.handle_failure(failure, request, response);
                    }
                }
                return;
            }
            tracing::error!(kind = entry.kind().name(), "Exception handler panicked");
        } else {
            tracing::error!(
                stage = %stage,
                method = request.request_method(),
                path = request.path_info(),
                error = %error,
                "Unhandled error in request handler"
            );
        }

        metrics::record_unhandled();
        self.internal_error(request, response);
    }

    fn internal_error(&self, request: &mut Request, response: &mut Response) {
        *response = Response::new();
        response.set_status(500);

        let Some(handler) = self.registry.internal_error() else {
            response.set_body(DEFAULT_INTERNAL_ERROR_BODY);
            return;
        };
        match invoke_route(handler, request, response) {
            Ok(Some(body)) => response.set_body(body),
            Ok(None) => {}
            Err(error) => {
                tracing::error!(error = %error, "Internal error handler failed");
                *response = Response::new();
                response.set_status(500);
                response.set_body(DEFAULT_INTERNAL_ERROR_BODY);
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("static_files", &self.static_files)
            .finish()
    }
}

fn invoke<T>(f: impl FnOnce() -> Result<T, HandlerError>) -> Result<T, HandlerError> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(Box::new(HandlerPanic::from_payload(payload))))
}

fn invoke_route(
    handler: &Arc<RouteFn>,
    request: &mut Request,
    response: &mut Response,
) -> RouteResult {
    invoke(|| handler(request, response))
}

fn request_uri(request: &Request) -> axum::http::Uri {
    let path_and_query = match request.query_string() {
        Some(query) => format!("{}?{}", request.path_info(), query),
        None => request.path_info().to_string(),
    };
    path_and_query.parse().unwrap_or_default()
}
