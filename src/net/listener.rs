//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve the configured host and port into a socket address
//! - Bind synchronously so bind errors surface from `start()` itself
//!
//! # Design Decisions
//! - The socket is bound with std and switched to non-blocking mode; the
//!   lifecycle converts it into a tokio listener inside the engine runtime
//! - Port 0 binds an ephemeral port; the real address is logged

use std::net::{IpAddr, SocketAddr, TcpListener};

use crate::config::ServerConfig;
use crate::error::{BridgeError, BridgeResult};

/// Resolve the listen address from `config`.
pub fn listen_addr(config: &ServerConfig) -> BridgeResult<SocketAddr> {
    let ip: IpAddr = config
        .host
        .parse()
        .map_err(|_| BridgeError::InvalidAddress(config.host.clone()))?;
    Ok(SocketAddr::new(ip, config.port))
}

/// Bind a non-blocking listener for `config`, returning it with the
/// address actually bound.
pub fn bind(config: &ServerConfig) -> BridgeResult<(TcpListener, SocketAddr)> {
    let addr = listen_addr(config)?;
    let listener = TcpListener::bind(addr).map_err(|source| BridgeError::Bind { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| BridgeError::Bind { addr, source })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| BridgeError::Bind { addr, source })?;
    tracing::info!(address = %local_addr, "Listener bound");
    Ok((listener, local_addr))
}
