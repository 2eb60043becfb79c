//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            programmatic setters (port, thread_pool, ...)
//!     → loader.rs (parse)              │
//!     → validation.rs (semantic)       │
//!     → BridgeConfig ◀─────────────────┘
//!     → snapshot taken by the lifecycle at start
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Changes after start apply on the next start, never to a running engine

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BridgeConfig, LimitsConfig, LogFormat, ObservabilityConfig, ServerConfig, SessionConfig,
    StaticFilesConfig, ThreadPoolConfig,
};
pub use validation::{validate_config, ValidationError};
