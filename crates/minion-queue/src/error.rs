//! Crate-local error type.
//!
//! Precondition failures (a job already reclaimed, a lock already held) are
//! never represented here - those are reported as `bool` return values per
//! the completion and lock APIs. This enum only covers failures a caller
//! cannot route around: a broken store, a migration that didn't apply, or
//! input that was invalid before it ever reached SQL.

use thiserror::Error;

/// Errors surfaced by [`crate::Backend`] operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The underlying SQLite connection pool reported an error (I/O,
    /// busy timeout exceeded, constraint violation, etc). The caller's
    /// responsibility, not the backend's, to decide whether to retry.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Migrations failed to apply on first use.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A structured payload (`args`, `result`, `notes`, worker `status`)
    /// could not be encoded or decoded as the canonical JSON text form.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Caller-supplied input was rejected before touching storage, e.g. a
    /// note key containing `.`, `[`, or `]`, or an unsupported listing
    /// filter combination.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, BackendError>;
