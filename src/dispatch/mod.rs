//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! engine request (buffered body, uploads parsed)
//!     → dispatcher.rs (before-filters → route → after-filters)
//!     → handler.rs (application closures, error kinds)
//!     → Return: finished Response view
//! ```

pub mod dispatcher;
pub mod handler;

pub use dispatcher::{Dispatcher, Stage};
pub use handler::{ErrorKind, HandlerError, HandlerPanic, IntoBody, RouteResult};
