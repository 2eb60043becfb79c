//! Spark-style routing on top of axum.
//!
//! Code written against the legacy declarative API (`get("/users/:id", ..)`,
//! before/after filters, exception handlers, `getParts()` uploads, lazy
//! sessions) runs unmodified on an axum/tokio engine.
//!
//! # Architecture Overview
//!
//! ```text
//!     registration               ┌──────────────┐
//!     ─────────────────────────▶ │   routing    │  translate :name → {name},
//!     (Bridge / spark::*)        │   registry   │  compile, store
//!                                └──────┬───────┘
//!                                       │ snapshot (ArcSwap)
//!     Client Request   ┌─────────┐ ┌────▼─────┐ ┌──────────────┐
//!     ───────────────▶ │   net   │▶│   http   │▶│   dispatch   │ before → route → after
//!                      │listener │ │  server  │ │  (blocking)  │ or error path
//!                      └─────────┘ └──────────┘ └──────┬───────┘
//!     Client Response                                   │
//!     ◀─────────────────────────────────── Response view┘
//!
//!     Cross-cutting: config, lifecycle (start/stop), observability
//! ```

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

// Legacy free-function surface
pub mod spark;

pub use config::BridgeConfig;
pub use dispatch::{ErrorKind, HandlerError, HandlerPanic, IntoBody};
pub use error::{BridgeError, BridgeResult};
pub use http::{Part, RawRequest, Request, Response, ResponseCookie, Session};
pub use lifecycle::{Bridge, ServerState};
