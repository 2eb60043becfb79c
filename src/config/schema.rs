//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a bridge instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener settings (host, port, shutdown grace).
    pub server: ServerConfig,

    /// Worker pool handed to the engine before it starts.
    pub thread_pool: ThreadPoolConfig,

    /// External static-file root.
    pub static_files: StaticFilesConfig,

    /// Engine-enforced request and upload limits.
    pub limits: LimitsConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Port to bind. `0` asks the OS for an ephemeral port.
    pub port: u16,

    /// How long `stop()` waits for in-flight requests, in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7070,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Worker pool configuration.
///
/// Handlers run on the runtime's blocking pool, so `max_threads` caps the
/// number of requests executing application code at once.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Async I/O workers (at least one is always started).
    pub min_threads: usize,

    /// Upper bound on handler threads.
    pub max_threads: usize,

    /// Idle handler threads are released after this many milliseconds.
    pub idle_timeout_ms: u64,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 8,
            max_threads: 200,
            idle_timeout_ms: 60_000,
        }
    }
}

/// Static file configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory on disk served as a fallback for unmatched GET/HEAD requests.
    pub external_location: Option<String>,
}

/// Limits enforced by the engine, independent of application policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Maximum size of a single uploaded file.
    pub max_file_size: Option<u64>,

    /// Maximum size of a whole multipart body.
    pub max_upload_size: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
            max_file_size: None,
            max_upload_size: None,
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the engine session id.
    pub cookie_name: String,

    /// Engine sessions idle this long are evicted. `0` keeps them forever.
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "JSESSIONID".to_string(),
            idle_timeout_secs: 1_800,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
