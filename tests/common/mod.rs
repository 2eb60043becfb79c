//! Shared utilities for integration testing.

#![allow(dead_code)]

use spark_bridge::config::ThreadPoolConfig;
use spark_bridge::observability::logging;
use spark_bridge::{Bridge, BridgeConfig};

/// Settings for a bridge on an ephemeral loopback port.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.shutdown_grace_ms = 500;
    config.thread_pool = ThreadPoolConfig {
        min_threads: 2,
        max_threads: 8,
        idle_timeout_ms: 5_000,
    };
    config.observability.log_level = "debug".to_string();
    config
}

/// A bridge that is not started yet.
pub fn bridge() -> Bridge {
    let config = test_config();
    logging::init(&config.observability);
    Bridge::with_config(config)
}

/// `http://host:port` of a running bridge.
pub fn base_url(bridge: &Bridge) -> String {
    let addr = bridge.local_addr().expect("bridge is not running");
    format!("http://{}", addr)
}

/// Non-pooled client that does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// The `name=value` part of a `Set-Cookie` header for `name`.
pub fn cookie_pair(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}
