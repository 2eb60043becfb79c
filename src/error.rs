//! Bridge error types.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::loader::ConfigError;

/// Errors raised by the bridge itself (never by application handlers).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("invalid value for header '{name}'")]
    InvalidHeader { name: String },

    #[error("multipart error: {0}")]
    Multipart(#[from] multer::Error),
}

impl BridgeError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        BridgeError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
