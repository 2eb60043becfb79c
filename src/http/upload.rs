//! Multipart upload compatibility.
//!
//! # Responsibilities
//! - Parse multipart bodies into the engine's upload records (via multer)
//! - Expose servlet-style `Part`s over those records
//! - Provide the legacy "raw request" accessor set
//!
//! # Design Decisions
//! - Uploads are grouped by field name in first-seen order; `get_parts`
//!   flattens groups in that order, then by arrival within a group
//! - Only parts carrying a filename become uploaded files; plain fields go
//!   to the form parameters
//! - Size limits belong to the engine (`LimitsConfig`), never to the shim
//! - Every `input_stream()` call opens a new reader over the stored content

use std::io::{Cursor, Read};

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LimitsConfig;
use crate::error::BridgeResult;
use crate::http::request::{ParamMap, Request};

/// Attribute key legacy code uses to hand multipart settings to the container.
pub const MULTIPART_CONFIG_ATTRIBUTE: &str = "org.eclipse.jetty.multipartConfig";

/// Attribute key the recognised multipart settings are stored under.
pub const MULTIPART_CONFIG_KEY: &str = "multipartConfig";

/// One uploaded file as recorded by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    field_name: String,
    filename: Option<String>,
    content_type: Option<String>,
    content: Bytes,
}

impl UploadedFile {
    pub fn new(
        field_name: impl Into<String>,
        filename: Option<String>,
        content_type: Option<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            filename,
            content_type,
            content: content.into(),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Filename extension including the dot, e.g. `.png`.
    pub fn extension(&self) -> Option<&str> {
        let name = self.filename.as_deref()?;
        name.rfind('.').map(|index| &name[index..])
    }

    /// Open a new reader over the file content.
    pub fn content(&self) -> UploadStream {
        UploadStream {
            inner: Cursor::new(self.content.clone()),
        }
    }
}

/// Single-use, forward-only reader over an uploaded file.
#[derive(Debug)]
pub struct UploadStream {
    inner: Cursor<Bytes>,
}

impl Read for UploadStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Uploaded files keyed by field name, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedFiles {
    groups: Vec<(String, Vec<UploadedFile>)>,
}

impl UploadedFiles {
    pub fn push(&mut self, file: UploadedFile) {
        match self
            .groups
            .iter_mut()
            .find(|(name, _)| *name == file.field_name)
        {
            Some((_, files)) => files.push(file),
            None => self.groups.push((file.field_name.clone(), vec![file])),
        }
    }

    /// First file uploaded under `name`.
    pub fn first(&self, name: &str) -> Option<&UploadedFile> {
        self.get(name).first()
    }

    /// All files uploaded under `name`; empty if none.
    pub fn get(&self, name: &str) -> &[UploadedFile] {
        self.groups
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, files)| files.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[UploadedFile])> {
        self.groups
            .iter()
            .map(|(name, files)| (name.as_str(), files.as_slice()))
    }

    /// Every file, group by group.
    pub fn files(&self) -> impl Iterator<Item = &UploadedFile> {
        self.groups.iter().flat_map(|(_, files)| files.iter())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    /// Total number of files across all fields.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, files)| files.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Parse a multipart body into uploaded files and plain form fields.
pub async fn parse_multipart(
    content_type: &str,
    body: Bytes,
    limits: &LimitsConfig,
) -> BridgeResult<(UploadedFiles, ParamMap)> {
    let boundary = multer::parse_boundary(content_type)?;

    let mut size_limit = multer::SizeLimit::new();
    if let Some(max) = limits.max_upload_size {
        size_limit = size_limit.whole_stream(max);
    }
    if let Some(max) = limits.max_file_size {
        size_limit = size_limit.per_field(max);
    }
    let constraints = multer::Constraints::new().size_limit(size_limit);

    let stream = futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

    let mut files = UploadedFiles::default();
    let mut fields = ParamMap::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(|mime| mime.to_string());
        let data = field.bytes().await?;

        match filename {
            Some(filename) => {
                files.push(UploadedFile::new(name, Some(filename), content_type, data));
            }
            None => fields.push(name, String::from_utf8_lossy(&data).into_owned()),
        }
    }

    tracing::debug!(files = files.len(), fields = fields.len(), "Parsed multipart body");
    Ok((files, fields))
}

/// Servlet-style view of one uploaded part.
#[derive(Debug, Clone, Copy)]
pub struct Part<'a> {
    file: &'a UploadedFile,
}

impl<'a> Part<'a> {
    pub fn new(file: &'a UploadedFile) -> Self {
        Self { file }
    }

    /// Form field name.
    pub fn name(&self) -> &'a str {
        self.file.field_name()
    }

    /// Client-supplied filename; `None` marks a plain form field.
    pub fn submitted_file_name(&self) -> Option<&'a str> {
        self.file.filename()
    }

    pub fn is_file(&self) -> bool {
        self.file.filename().is_some()
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn content_type(&self) -> Option<&'a str> {
        self.file.content_type()
    }

    /// Open the part content. Read it to the end once, then drop it.
    pub fn input_stream(&self) -> UploadStream {
        self.file.content()
    }

    pub fn uploaded_file(&self) -> &'a UploadedFile {
        self.file
    }
}

/// Multipart settings carried by legacy code through a request attribute.
///
/// Sizes follow the servlet convention: `-1` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartConfig {
    pub location: String,
    #[serde(default = "unlimited")]
    pub max_file_size: i64,
    #[serde(default = "unlimited")]
    pub max_request_size: i64,
    #[serde(default)]
    pub file_size_threshold: i64,
}

fn unlimited() -> i64 {
    -1
}

impl MultipartConfig {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            max_file_size: -1,
            max_request_size: -1,
            file_size_threshold: 0,
        }
    }

    pub fn with_limits(
        mut self,
        max_file_size: i64,
        max_request_size: i64,
        file_size_threshold: i64,
    ) -> Self {
        self.max_file_size = max_file_size;
        self.max_request_size = max_request_size;
        self.file_size_threshold = file_size_threshold;
        self
    }
}

impl From<MultipartConfig> for Value {
    fn from(config: MultipartConfig) -> Self {
        serde_json::json!({
            "location": config.location,
            "maxFileSize": config.max_file_size,
            "maxRequestSize": config.max_request_size,
            "fileSizeThreshold": config.file_size_threshold,
        })
    }
}

/// Legacy raw-request accessors over a [`Request`].
#[derive(Debug)]
pub struct RawRequest<'a> {
    request: &'a mut Request,
}

impl<'a> RawRequest<'a> {
    pub(crate) fn new(request: &'a mut Request) -> Self {
        Self { request }
    }

    pub fn get_part(&self, name: &str) -> Option<Part<'_>> {
        self.request.get_part(name)
    }

    pub fn get_parts(&self) -> Vec<Part<'_>> {
        self.request.get_parts()
    }

    /// Set a request attribute.
    ///
    /// A value stored under [`MULTIPART_CONFIG_ATTRIBUTE`] that has the shape
    /// of a [`MultipartConfig`] is also kept under [`MULTIPART_CONFIG_KEY`].
    /// Upload parsing is unaffected either way.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if name == MULTIPART_CONFIG_ATTRIBUTE {
            if let Ok(config) = serde_json::from_value::<MultipartConfig>(value.clone()) {
                tracing::debug!(location = %config.location, "Recorded legacy multipart config");
                self.request.set_attribute(MULTIPART_CONFIG_KEY, config);
            }
        }
        self.request.set_attribute(name, value);
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.request.attribute(name)
    }

    pub fn get_method(&self) -> &str {
        self.request.request_method()
    }

    pub fn get_request_uri(&self) -> &str {
        self.request.path_info()
    }

    pub fn get_query_string(&self) -> Option<&str> {
        self.request.query_string()
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn get_content_type(&self) -> Option<&str> {
        self.request.content_type()
    }

    pub fn get_content_length(&self) -> Option<u64> {
        self.request.content_length()
    }

    pub fn request(&mut self) -> &mut Request {
        self.request
    }
}
