//! Tunables owned by the backend (§4.9, §6.3). Mirrors the builder idiom
//! the coordination layer this crate grew out of uses for its
//! `RuntimeBuilder`/`EngineBuilder`: a plain value struct assembled with a
//! builder, with IO (opening the pool, running migrations) deferred to a
//! single `connect` call.

use std::time::Duration;

/// Maps a retry count to a backoff delay in seconds. The reference default
/// is `15 + retries^4` (§4.3).
pub type BackoffFn = fn(i32) -> i64;

pub(crate) fn default_backoff(retries: i32) -> i64 {
    15 + retries.pow(4) as i64
}

/// Tunable defaults for one [`crate::Backend`] instance.
#[derive(Clone)]
pub struct BackendConfig {
    pub(crate) database_url: String,
    pub(crate) max_connections: u32,
    pub(crate) dequeue_interval: Duration,
    pub(crate) missing_after: Duration,
    pub(crate) remove_after: Duration,
    pub(crate) stuck_after: Duration,
    pub(crate) backoff: BackoffFn,
}

impl BackendConfig {
    /// Start building a config pointed at `database_url` (an sqlite DSN;
    /// use `sqlite::memory:` for tests).
    pub fn builder(database_url: impl Into<String>) -> BackendConfigBuilder {
        BackendConfigBuilder {
            database_url: database_url.into(),
            max_connections: 5,
            dequeue_interval: Duration::from_millis(500),
            missing_after: Duration::from_secs(30),
            remove_after: Duration::from_secs(3 * 24 * 60 * 60),
            stuck_after: Duration::from_secs(2 * 24 * 60 * 60),
            backoff: default_backoff,
        }
    }
}

/// Builder for [`BackendConfig`]. Every field has a spec-mandated default
/// (§6.3); call only the setters you need to override.
pub struct BackendConfigBuilder {
    database_url: String,
    max_connections: u32,
    dequeue_interval: Duration,
    missing_after: Duration,
    remove_after: Duration,
    stuck_after: Duration,
    backoff: BackoffFn,
}

impl BackendConfigBuilder {
    /// SQLite allows one writer at a time; this pool size only bounds
    /// concurrent readers. Default 5, matching the driver's own default.
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// How long `dequeue` sleeps between polling attempts (default 500ms).
    pub fn dequeue_interval(mut self, interval: Duration) -> Self {
        self.dequeue_interval = interval;
        self
    }

    /// How long a worker may go without a heartbeat before `repair`
    /// considers it dead (default 30s).
    pub fn missing_after(mut self, missing_after: Duration) -> Self {
        self.missing_after = missing_after;
        self
    }

    /// How long a finished job is kept before `repair` deletes it
    /// (default 3 days).
    pub fn remove_after(mut self, remove_after: Duration) -> Self {
        self.remove_after = remove_after;
        self
    }

    /// How long an inactive job may sit past its `delayed` time before
    /// `repair` force-fails it as stuck (default 2 days).
    pub fn stuck_after(mut self, stuck_after: Duration) -> Self {
        self.stuck_after = stuck_after;
        self
    }

    /// Override the retry-count-to-delay-seconds function (default
    /// `15 + retries^4`).
    pub fn backoff(mut self, backoff: BackoffFn) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> BackendConfig {
        BackendConfig {
            database_url: self.database_url,
            max_connections: self.max_connections,
            dequeue_interval: self.dequeue_interval,
            missing_after: self.missing_after,
            remove_after: self.remove_after,
            stuck_after: self.stuck_after,
            backoff: self.backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_matches_reference_formula() {
        assert_eq!(default_backoff(0), 15);
        assert_eq!(default_backoff(1), 16);
        assert_eq!(default_backoff(2), 31);
        assert_eq!(default_backoff(3), 96);
    }
}
