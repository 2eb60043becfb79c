//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     legacy pattern (/users/:id)
//!     → path.rs (translate to /users/{id})
//!     → matcher.rs (compile segments)
//!     → registry.rs (store route / filter / handler)
//!
//! Dispatch:
//!     (method, path)
//!     → registry.rs (every matching filter, first matching route)
//!     → Return: entries plus captured params
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at registration, immutable at dispatch
//! - No regex in hot path (segment matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod path;
pub mod registry;

pub use matcher::{PathMatch, PathPattern};
pub use path::translate;
pub use registry::{
    ExceptionHandlerEntry, FilterEntry, FilterPhase, RouteEntry, RouteMatch, RouteRegistry,
};
