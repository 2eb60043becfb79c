//! Legacy response view.
//!
//! # Responsibilities
//! - Hold status, headers, cookies and body while filters and routes run
//! - Track whether a redirect was issued so the route result cannot
//!   overwrite it
//! - Convert into an engine response once dispatch finishes
//!
//! # Design Decisions
//! - Header names and values are validated when set, not at conversion
//! - Status defaults to 200; a body without `Content-Type` is sent as
//!   UTF-8 plain text

use std::borrow::Cow;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::error::{BridgeError, BridgeResult};

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// One `Set-Cookie` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    name: String,
    value: String,
    path: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Lifetime in seconds; `0` deletes the cookie.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Response view handed to filters, routes and handlers.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
    redirected: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
            redirected: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Set the status code. Codes outside 100..=999 are ignored.
    pub fn set_status(&mut self, code: u16) {
        match StatusCode::from_u16(code) {
            Ok(status) => self.status = status,
            Err(_) => tracing::warn!(code, "Ignoring invalid status code"),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    pub fn set_content_type(&mut self, content_type: &str) -> BridgeResult<()> {
        self.set_header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Current body as text, if one was set.
    pub fn body(&self) -> Option<Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(Bytes::from(body.into()));
    }

    pub fn set_body_bytes(&mut self, body: impl Into<Bytes>) {
        self.body = Some(body.into());
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set a header, replacing any previous values.
    pub fn set_header(&mut self, name: &str, value: &str) -> BridgeResult<()> {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Add a header value, keeping previous ones.
    pub fn append_header(&mut self, name: &str, value: &str) -> BridgeResult<()> {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn cookie(&mut self, name: &str, value: &str) -> BridgeResult<()> {
        self.set_cookie(ResponseCookie::new(name, value))
    }

    pub fn set_cookie(&mut self, cookie: ResponseCookie) -> BridgeResult<()> {
        self.append_header(header::SET_COOKIE.as_str(), &cookie.to_header_value())
    }

    /// Expire a cookie on the client.
    pub fn remove_cookie(&mut self, name: &str) -> BridgeResult<()> {
        self.set_cookie(ResponseCookie::new(name, "").path("/").max_age(0))
    }

    /// Redirect with 302 Found.
    pub fn redirect(&mut self, location: &str) -> BridgeResult<()> {
        self.redirect_with_status(location, StatusCode::FOUND.as_u16())
    }

    pub fn redirect_with_status(&mut self, location: &str, code: u16) -> BridgeResult<()> {
        self.set_header(header::LOCATION.as_str(), location)?;
        self.set_status(code);
        self.redirected = true;
        Ok(())
    }

    /// True once a redirect was issued during this dispatch.
    pub fn is_redirected(&self) -> bool {
        self.redirected
    }

    /// Convert into an engine response.
    pub fn into_http(mut self) -> axum::response::Response {
        if self.body.is_some() && !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
            );
        }
        let body = self.body.map(Body::from).unwrap_or_else(Body::empty);
        let mut response = axum::response::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn header_pair(name: &str, value: &str) -> BridgeResult<(HeaderName, HeaderValue)> {
    let invalid = || BridgeError::InvalidHeader {
        name: name.to_string(),
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((header_name, header_value))
}
