//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, body limit, multipart parsing)
//!     → request.rs / upload.rs / session.rs (legacy request view)
//!     → [dispatcher runs filters and routes]
//!     → response.rs (legacy response view → engine response)
//!     → static_files.rs (fallback for unmatched GET/HEAD)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod static_files;
pub mod upload;

pub use request::{ParamMap, Request};
pub use response::{Response, ResponseCookie};
pub use server::HttpServer;
pub use session::{Session, SessionStore};
pub use static_files::StaticFiles;
pub use upload::{
    MultipartConfig, Part, RawRequest, UploadStream, UploadedFile, UploadedFiles,
    MULTIPART_CONFIG_ATTRIBUTE, MULTIPART_CONFIG_KEY,
};
