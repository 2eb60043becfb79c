//! Legacy request view.
//!
//! # Responsibilities
//! - Wrap one engine request for the lifetime of one dispatch
//! - Expose legacy accessors: params, query, headers, cookies, body,
//!   attributes, session, uploads
//! - Report missing values as `None`, never as errors
//!
//! # Design Decisions
//! - Query, cookies and form fields are parsed once, when the view is built
//! - Path params are replaced by the dispatcher before each filter/route,
//!   so a handler only sees captures from its own pattern
//! - Attributes and sessions write through immediately

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::session::{ServerSession, Session, SessionStore};
use crate::http::upload::{
    MultipartConfig, Part, RawRequest, UploadedFile, UploadedFiles, MULTIPART_CONFIG_KEY,
};
use crate::routing::PathMatch;

/// Ordered multi-valued string map (query strings, form bodies, cookies).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    pairs: Vec<(String, String)>,
}

impl ParamMap {
    /// Parse `application/x-www-form-urlencoded` text.
    pub fn parse_urlencoded(input: &str) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(input.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// Parse a `Cookie` request header value.
    pub fn parse_cookies(input: &str) -> Self {
        let mut cookies = Self::default();
        for pair in input.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                let value = value.trim().trim_matches('"');
                cookies.push(name.trim(), value);
            }
        }
        cookies
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Distinct names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.pairs {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Names mapped to all their values.
    pub fn to_multimap(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in &self.pairs {
            map.entry(name.clone()).or_default().push(value.clone());
        }
        map
    }

    pub fn extend(&mut self, other: ParamMap) {
        self.pairs.extend(other.pairs);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Request view handed to filters, routes and handlers.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    local_port: u16,
    query: ParamMap,
    form: ParamMap,
    cookies: ParamMap,
    uploads: UploadedFiles,
    params: HashMap<String, String>,
    splat: Vec<String>,
    attributes: HashMap<String, Value>,
    sessions: Arc<SessionStore>,
    session_cookie: String,
    engine_session: Option<Arc<ServerSession>>,
    session_created: bool,
}

impl Request {
    /// Build a view from an engine request whose body is already buffered.
    pub fn from_parts(parts: axum::http::request::Parts, body: Bytes) -> Self {
        let query = parts
            .uri
            .query()
            .map(ParamMap::parse_urlencoded)
            .unwrap_or_default();

        let mut cookies = ParamMap::default();
        for value in parts.headers.get_all(header::COOKIE) {
            if let Ok(value) = value.to_str() {
                cookies.extend(ParamMap::parse_cookies(value));
            }
        }

        let is_form = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| {
                ct.to_ascii_lowercase()
                    .starts_with("application/x-www-form-urlencoded")
            });
        let form = if is_form {
            ParamMap::parse_urlencoded(&String::from_utf8_lossy(&body))
        } else {
            ParamMap::default()
        };

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr: None,
            local_port: 0,
            query,
            form,
            cookies,
            uploads: UploadedFiles::default(),
            params: HashMap::new(),
            splat: Vec::new(),
            attributes: HashMap::new(),
            sessions: Arc::new(SessionStore::new()),
            session_cookie: "JSESSIONID".to_string(),
            engine_session: None,
            session_created: false,
        }
    }

    /// Attach connection details.
    pub fn with_connection(mut self, remote_addr: Option<SocketAddr>, local_port: u16) -> Self {
        self.remote_addr = remote_addr;
        self.local_port = local_port;
        self
    }

    /// Attach the engine session store; an existing session is picked up
    /// from the cookie named `cookie_name`.
    pub fn with_sessions(mut self, sessions: Arc<SessionStore>, cookie_name: &str) -> Self {
        self.engine_session = self
            .cookies
            .first(cookie_name)
            .and_then(|id| sessions.get(id));
        self.sessions = sessions;
        self.session_cookie = cookie_name.to_string();
        self
    }

    /// Attach parsed multipart content.
    pub fn with_uploads(mut self, uploads: UploadedFiles, fields: ParamMap) -> Self {
        self.uploads = uploads;
        self.form.extend(fields);
        self
    }

    pub(crate) fn set_path_match(&mut self, captured: PathMatch) {
        self.params = captured.params;
        self.splat = captured.splat;
    }

    /// Engine session id created during this request, if any.
    pub(crate) fn take_created_session(&mut self) -> Option<(String, String)> {
        if !std::mem::take(&mut self.session_created) {
            return None;
        }
        self.engine_session
            .as_ref()
            .filter(|s| self.sessions.contains(s.id()))
            .map(|s| (self.session_cookie.clone(), s.id().to_string()))
    }

    // === Route parameters ===

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Path parameter by name; a leading `:` is ignored.
    pub fn param(&self, name: &str) -> Option<&str> {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.params.get(name).map(String::as_str)
    }

    /// Suffixes captured by a trailing `*`.
    pub fn splat(&self) -> &[String] {
        &self.splat
    }

    // === Request line and connection ===

    pub fn request_method(&self) -> &str {
        self.method.as_str()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST.as_str())
            .or_else(|| self.uri.host())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    /// Port the server accepted this request on.
    pub fn port(&self) -> u16 {
        self.local_port
    }

    pub fn path_info(&self) -> &str {
        self.uri.path()
    }

    pub fn servlet_path(&self) -> &str {
        self.uri.path()
    }

    /// Always empty: the bridge is mounted at the root.
    pub fn context_path(&self) -> &str {
        ""
    }

    pub fn url(&self) -> String {
        let host = self.host().unwrap_or("localhost");
        format!("{}://{}{}", self.scheme(), host, self.uri.path())
    }

    pub fn ip(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.ip().to_string())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse().ok())
    }

    // === Query string ===

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.first(name)
    }

    pub fn query_param_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.query.first(name).unwrap_or(default)
    }

    /// Every value of a repeated key; empty if absent.
    pub fn query_param_values(&self, name: &str) -> Vec<&str> {
        self.query.all(name)
    }

    pub fn query_params(&self) -> Vec<&str> {
        self.query.names()
    }

    pub fn query_map(&self) -> &ParamMap {
        &self.query
    }

    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    // === Headers, cookies, body ===

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> Vec<&str> {
        self.headers.keys().map(|name| name.as_str()).collect()
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.first(name)
    }

    pub fn cookies(&self) -> Vec<&str> {
        self.cookies.names()
    }

    pub fn body(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    // === Form parameters ===

    pub fn form_param(&self, name: &str) -> Option<&str> {
        self.form.first(name)
    }

    pub fn form_params(&self) -> HashMap<String, Vec<String>> {
        self.form.to_multimap()
    }

    // === Attributes ===

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attribute_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.attributes
            .get(name)
            .and_then(|value| T::deserialize(value).ok())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }

    /// Multipart settings recorded through the raw request, if any.
    pub fn multipart_config(&self) -> Option<MultipartConfig> {
        self.attribute_as(MULTIPART_CONFIG_KEY)
    }

    // === Session ===

    /// The legacy session, created in the engine store on first use or
    /// after the current one was invalidated.
    pub fn session(&mut self) -> Session {
        let live = self
            .engine_session
            .as_ref()
            .filter(|existing| self.sessions.contains(existing.id()))
            .map(Arc::clone);
        let engine_session = match live {
            Some(existing) => existing,
            None => {
                let created = self.sessions.create();
                self.engine_session = Some(Arc::clone(&created));
                self.session_created = true;
                created
            }
        };
        Session::attach(&self.sessions, &engine_session)
    }

    pub fn has_session(&self) -> bool {
        self.engine_session
            .as_ref()
            .is_some_and(|existing| self.sessions.contains(existing.id()))
    }

    pub fn session_attribute<T: DeserializeOwned>(&mut self, name: &str) -> Option<T> {
        self.session().attribute_as(name)
    }

    pub fn set_session_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.session().set_attribute(name, value);
    }

    // === Uploads ===

    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/"))
    }

    pub fn uploaded_file(&self, name: &str) -> Option<&UploadedFile> {
        self.uploads.first(name)
    }

    pub fn uploaded_files_named(&self, name: &str) -> &[UploadedFile] {
        self.uploads.get(name)
    }

    pub fn uploaded_files(&self) -> &UploadedFiles {
        &self.uploads
    }

    /// First part uploaded under `name`.
    pub fn get_part(&self, name: &str) -> Option<Part<'_>> {
        self.uploads.first(name).map(Part::new)
    }

    pub fn get_parts(&self) -> Vec<Part<'_>> {
        self.uploads.files().map(Part::new).collect()
    }

    pub fn get_parts_count(&self) -> usize {
        self.uploads.len()
    }

    /// Servlet-style accessor set.
    pub fn raw(&mut self) -> RawRequest<'_> {
        RawRequest::new(self)
    }
}

impl From<axum::http::Request<Bytes>> for Request {
    fn from(request: axum::http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::upload::{MultipartConfig, MULTIPART_CONFIG_ATTRIBUTE};

    fn request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .header("Host", "example.com:8080")
            .header("Cookie", "theme=dark; token=\"abc\"")
            .body(Bytes::from_static(b"payload"))
            .unwrap()
            .into()
    }

    #[test]
    fn param_accepts_legacy_and_bare_names() {
        let mut req = request("/x/42");
        let pattern = crate::routing::PathPattern::parse("/x/{id}").unwrap();
        req.set_path_match(pattern.matches("/x/42").unwrap());

        assert_eq!(req.param(":id"), Some("42"));
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("nope"), None);
    }

    #[test]
    fn query_accessors() {
        let req = request("/search?q=rust&tag=a&tag=b&empty=");
        assert_eq!(req.query_param("q"), Some("rust"));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(req.query_param_or("missing", "fallback"), "fallback");
        assert_eq!(req.query_param_or("q", "fallback"), "rust");
        assert_eq!(req.query_param_values("tag"), vec!["a", "b"]);
        assert!(req.query_param_values("none").is_empty());
        assert_eq!(req.query_params(), vec!["q", "tag", "empty"]);
        assert_eq!(req.query_string(), Some("q=rust&tag=a&tag=b&empty="));
    }

    #[test]
    fn headers_cookies_body() {
        let req = request("/a");
        assert_eq!(req.header("host"), Some("example.com:8080"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("token"), Some("abc"));
        assert_eq!(req.cookie("none"), None);
        assert_eq!(req.body(), "payload");
        assert_eq!(req.body_bytes(), b"payload");
        assert_eq!(req.url(), "http://example.com:8080/a");
        assert_eq!(req.context_path(), "");
        assert_eq!(req.content_length(), None);
    }

    #[test]
    fn multipart_detection_is_case_insensitive() {
        let req: Request = axum::http::Request::builder()
            .uri("/up")
            .header("Content-Type", "Multipart/Form-Data; boundary=x")
            .body(Bytes::new())
            .unwrap()
            .into();
        assert!(req.is_multipart());
        assert!(!request("/a").is_multipart());
    }

    #[test]
    fn urlencoded_body_becomes_form_params() {
        let req: Request = axum::http::Request::builder()
            .method("POST")
            .uri("/users")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"name=John+Doe&role=a&role=b"))
            .unwrap()
            .into();
        assert_eq!(req.form_param("name"), Some("John Doe"));
        assert_eq!(req.form_params()["role"], vec!["a", "b"]);
    }

    #[test]
    fn attributes_write_through() {
        let mut req = request("/a");
        req.set_attribute("user", "alice");
        req.set_attribute("visits", 3);
        assert_eq!(req.attribute("user"), Some(&Value::from("alice")));
        assert_eq!(req.attribute_as::<u32>("visits"), Some(3));
        assert_eq!(req.remove_attribute("user"), Some(Value::from("alice")));
        assert_eq!(req.attributes(), vec!["visits"]);
    }

    #[test]
    fn session_created_lazily_once() {
        let store = Arc::new(SessionStore::new());
        let mut req = request("/a").with_sessions(Arc::clone(&store), "JSESSIONID");
        assert!(!req.has_session());

        req.set_session_attribute("count", 1);
        assert_eq!(req.session_attribute::<i32>("count"), Some(1));
        assert_eq!(store.len(), 1);

        let (cookie, id) = req.take_created_session().unwrap();
        assert_eq!(cookie, "JSESSIONID");
        assert!(store.get(&id).is_some());
        assert!(req.take_created_session().is_none());
    }

    #[test]
    fn invalidated_session_is_replaced_within_the_request() {
        let store = Arc::new(SessionStore::new());
        let mut req = request("/a").with_sessions(Arc::clone(&store), "JSESSIONID");

        let first = req.session();
        first.set_attribute("user", "alice");
        first.invalidate();
        assert!(!req.has_session());
        assert!(store.is_empty());

        req.set_session_attribute("user", "bob");
        assert_eq!(store.len(), 1);
        assert_eq!(req.session_attribute::<String>("user").as_deref(), Some("bob"));
        let (_, id) = req.take_created_session().unwrap();
        assert!(store.contains(&id));
    }

    #[test]
    fn session_invalidated_in_the_same_request_emits_no_cookie() {
        let store = Arc::new(SessionStore::new());
        let mut req = request("/a").with_sessions(Arc::clone(&store), "JSESSIONID");
        req.session().invalidate();
        assert!(req.take_created_session().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn existing_session_found_by_cookie() {
        let store = Arc::new(SessionStore::new());
        let engine = store.create();
        Session::attach(&store, &engine).set_attribute("user", "bob");

        let mut req: Request = axum::http::Request::builder()
            .uri("/a")
            .header("Cookie", format!("SID={}", engine.id()))
            .body(Bytes::new())
            .unwrap()
            .into();
        req = req.with_sessions(store, "SID");

        assert!(req.has_session());
        assert_eq!(req.session_attribute::<String>("user").as_deref(), Some("bob"));
        assert!(req.take_created_session().is_none());
    }

    #[test]
    fn parts_exclude_plain_fields() {
        let mut uploads = UploadedFiles::default();
        uploads.push(UploadedFile::new(
            "avatar",
            Some("a.png".into()),
            Some("image/png".into()),
            &b"1"[..],
        ));
        uploads.push(UploadedFile::new("resume", Some("cv.pdf".into()), None, &b"22"[..]));
        let mut fields = ParamMap::default();
        fields.push("title", "hello");

        let req = request("/up").with_uploads(uploads, fields);
        let parts = req.get_parts();

        assert_eq!(parts.len(), 2);
        assert_eq!(req.get_parts_count(), 2);
        assert!(parts.iter().all(|p| p.submitted_file_name().is_some()));
        assert_eq!(req.get_part("resume").map(|p| p.size()), Some(2));
        assert!(req.get_part("title").is_none());
        assert_eq!(req.form_param("title"), Some("hello"));
    }

    #[test]
    fn raw_request_records_multipart_config() {
        let mut uploads = UploadedFiles::default();
        uploads.push(UploadedFile::new("file", Some("x.txt".into()), None, &b"abc"[..]));
        let mut req = request("/up?x=1").with_uploads(uploads, ParamMap::default());

        let mut raw = req.raw();
        raw.set_attribute(MULTIPART_CONFIG_ATTRIBUTE, MultipartConfig::new("/tmp"));
        raw.set_attribute("plain", "value");
        assert_eq!(raw.get_method(), "GET");
        assert_eq!(raw.get_request_uri(), "/up");
        assert_eq!(raw.get_query_string(), Some("x=1"));
        assert!(raw.get_attribute(MULTIPART_CONFIG_ATTRIBUTE).is_some());
        assert_eq!(raw.get_parts().len(), 1);
        assert_eq!(raw.get_part("file").and_then(|p| p.submitted_file_name()), Some("x.txt"));

        assert_eq!(req.multipart_config().map(|c| c.location), Some("/tmp".to_string()));
        assert_eq!(req.get_parts_count(), 1);
    }
}
