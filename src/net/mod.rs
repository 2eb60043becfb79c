//! Network layer.
//!
//! # Data Flow
//! ```text
//! ServerConfig (host, port)
//!     → listener.rs (bind, non-blocking)
//!     → lifecycle (tokio listener inside the engine runtime)
//!     → http::server (accept loop via axum::serve)
//! ```

pub mod listener;

pub use listener::{bind, listen_addr};
