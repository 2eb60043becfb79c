//! Engine runtime construction.
//!
//! The thread-pool knob is handed to tokio's builder as given:
//! `min_threads` sizes the async worker pool (never below one),
//! `max_threads` caps the blocking pool handlers run on, and
//! `idle_timeout_ms` is how long an idle handler thread is kept.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::config::ThreadPoolConfig;
use crate::error::{BridgeError, BridgeResult};

pub fn build(pool: &ThreadPoolConfig) -> BridgeResult<Runtime> {
    tracing::debug!(
        min_threads = pool.min_threads,
        max_threads = pool.max_threads,
        idle_timeout_ms = pool.idle_timeout_ms,
        "Building engine runtime"
    );
    Builder::new_multi_thread()
        .worker_threads(pool.min_threads.max(1))
        .max_blocking_threads(pool.max_threads.max(1))
        .thread_keep_alive(Duration::from_millis(pool.idle_timeout_ms))
        .thread_name("spark-bridge-worker")
        .enable_all()
        .build()
        .map_err(BridgeError::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_minimum_still_builds() {
        let pool = ThreadPoolConfig {
            min_threads: 0,
            max_threads: 2,
            idle_timeout_ms: 100,
        };
        let runtime = build(&pool).unwrap();
        assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
    }
}
