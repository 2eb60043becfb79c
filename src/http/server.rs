//! HTTP engine setup.
//!
//! # Responsibilities
//! - Create the axum Router with one universal fallback handler
//! - Wire up middleware (request ID, tracing, body limit)
//! - Buffer the body and parse uploads before dispatch
//! - Hand each request to the dispatcher on the blocking pool
//!
//! # Design Decisions
//! - axum's own route table is not used: registrations change after start
//!   and the dispatcher needs every matching filter, not one route
//! - The registry snapshot is loaded once per request, so a registration
//!   never changes a request already in flight
//! - Body and multipart limits are enforced here, before application code

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request as HttpRequest, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::LimitsConfig;
use crate::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::http::request::{ParamMap, Request};
use crate::http::session::SessionStore;
use crate::http::static_files::StaticFiles;
use crate::http::upload::{parse_multipart, UploadedFiles};
use crate::routing::RouteRegistry;

/// Application state injected into the fallback handler.
#[derive(Clone)]
pub struct EngineState {
    pub registry: Arc<ArcSwap<RouteRegistry>>,
    pub sessions: Arc<SessionStore>,
    pub static_files: Option<StaticFiles>,
    pub limits: LimitsConfig,
    pub cookie_name: Arc<str>,
    pub local_port: u16,
}

/// The bridge's HTTP engine.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: EngineState) -> Self {
        let router = Self::build_router(state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: EngineState) -> Router {
        let max_body_size = state.limits.max_body_size;
        Router::new()
            .fallback(dispatch_entry)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &HttpRequest<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::debug_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}

/// Universal handler: every request the engine accepts lands here.
async fn dispatch_entry(
    State(state): State<EngineState>,
    request: HttpRequest<Body>,
) -> HttpResponse {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.limits.max_body_size).await {
        Ok(body) => body,
        Err(error) => {
            tracing::warn!(error = %error, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };

    let multipart_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| ct.to_ascii_lowercase().starts_with("multipart/"))
        .map(str::to_string);

    let (uploads, fields) = match multipart_type {
        Some(content_type) => {
            match parse_multipart(&content_type, body.clone(), &state.limits).await {
                Ok(parsed) => parsed,
                Err(error) => return multipart_rejection(error),
            }
        }
        None => (UploadedFiles::default(), ParamMap::default()),
    };

    let request = Request::from_parts(parts, body)
        .with_connection(remote_addr, state.local_port)
        .with_sessions(Arc::clone(&state.sessions), &state.cookie_name)
        .with_uploads(uploads, fields);
    let dispatcher = Dispatcher::new(state.registry.load_full(), state.static_files.clone());

    match tokio::task::spawn_blocking(move || dispatcher.dispatch(request)).await {
        Ok(response) => response.into_http(),
        Err(error) => {
            tracing::error!(error = %error, "Dispatch task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn multipart_rejection(error: BridgeError) -> HttpResponse {
    let status = match &error {
        BridgeError::Multipart(
            multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. },
        ) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    tracing::warn!(error = %error, status = %status, "Rejected multipart body");
    (status, status.canonical_reason().unwrap_or("Bad Request")).into_response()
}
