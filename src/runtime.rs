//! Tokio runtime for the binary.
//!
//! Probes block on their sockets inside `spawn_blocking`, so the blocking
//! pool is sized to the probe concurrency.

use crate::error::RelayError;

pub fn build_runtime(concurrency: usize) -> Result<tokio::runtime::Runtime, RelayError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("best-relay")
        .max_blocking_threads(concurrency.max(1))
        .build()
        .map_err(|e| RelayError::Runtime(format!("failed to create tokio runtime: {}", e)))
}
