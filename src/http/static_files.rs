//! Static file serving from an external directory.
//!
//! # Responsibilities
//! - Validate the configured root once, when the server starts
//! - Serve GET/HEAD requests no route claimed, using tower-http's `ServeDir`
//!
//! # Design Decisions
//! - A root that is missing (or not a directory) is logged and skipped;
//!   the server starts without static serving
//! - A miss is reported as `None` so the dispatcher can fall through to the
//!   not-found handler
//! - Files are buffered into the response view so after-filters can still
//!   adjust headers

use std::path::{Path, PathBuf};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// A served static file.
#[derive(Debug)]
pub struct StaticHit {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// An external static-file root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    service: ServeDir,
}

impl StaticFiles {
    /// Use `location` as the static root, or `None` (with a warning) if it
    /// does not exist on disk.
    pub fn configure(location: impl AsRef<Path>) -> Option<Self> {
        let root = location.as_ref();
        if !root.is_dir() {
            tracing::warn!(
                location = %root.display(),
                "Static file location does not exist; serving without static files"
            );
            return None;
        }

        tracing::info!(location = %root.display(), "Serving static files");
        Some(Self {
            root: root.to_path_buf(),
            service: ServeDir::new(root).append_index_html_on_directories(true),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Try to serve `uri` from the root.
    pub async fn serve(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Option<StaticHit> {
        if method != Method::GET && method != Method::HEAD {
            return None;
        }

        let mut request = axum::http::Request::new(Body::empty());
        *request.method_mut() = method.clone();
        *request.uri_mut() = uri.clone();
        *request.headers_mut() = headers.clone();

        let response = match self.service.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        if response.status() == StatusCode::NOT_FOUND
            || response.status() == StatusCode::METHOD_NOT_ALLOWED
        {
            return None;
        }

        let (parts, body) = response.into_parts();
        let body = match axum::body::to_bytes(Body::new(body), usize::MAX).await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(path = %uri.path(), error = %error, "Failed to read static file");
                return None;
            }
        };

        tracing::debug!(path = %uri.path(), status = %parts.status, "Static file served");
        Some(StaticHit {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
