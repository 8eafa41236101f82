//! Test harness helpers for exercising [`minion_queue::Backend`] without a
//! real database file.

use minion_queue::{Backend, BackendConfig};
use serde_json::{Map, Value};

/// Connect a fresh in-memory backend with migrations applied.
///
/// Pinned to a single pool connection: SQLite's `:memory:` database is
/// private to the connection that opened it, so a pool with more than one
/// connection would hand different tests (or different calls within the
/// same test) completely separate, empty databases.
pub async fn setup() -> Backend {
    let config = BackendConfig::builder("sqlite::memory:")
        .max_connections(1)
        .build();

    Backend::connect(config)
        .await
        .expect("failed to open in-memory backend")
}

/// Register a worker with an empty status map and return its id.
pub async fn register_worker(backend: &Backend, host: &str) -> i64 {
    backend
        .register_worker(None, host, std::process::id() as i64, Map::new())
        .await
        .expect("failed to register worker")
}

/// Enqueue `task` with no args and default options, returning the new job id.
pub async fn enqueue(backend: &Backend, task: &str) -> i64 {
    backend
        .enqueue(task, Value::Null, Default::default())
        .await
        .expect("failed to enqueue job")
}
