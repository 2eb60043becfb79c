//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (bridge.rs):
//!     registration or start() → validate config → build runtime (runtime.rs)
//!     → bind listener → spawn accept loop
//!
//! Shutdown (shutdown.rs):
//!     stop() → trigger → drain connections (bounded by grace) → drop runtime
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then runtime, then listener
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: open connections are dropped after the grace period

pub mod bridge;
pub mod runtime;
pub mod shutdown;

pub use bridge::{Bridge, ServerState};
pub use shutdown::Shutdown;
