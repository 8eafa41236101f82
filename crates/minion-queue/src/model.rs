//! Domain types shared across the backend's public API: jobs, workers,
//! locks, and the option/filter structs their operations take.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// A job's position in its lifecycle (§3, Lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Inactive,
    Active,
    Failed,
    Finished,
}

impl JobState {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            JobState::Inactive => "inactive",
            JobState::Active => "active",
            JobState::Failed => "failed",
            JobState::Finished => "finished",
        }
    }

    pub(crate) fn from_sql(raw: &str) -> Self {
        match raw {
            "inactive" => JobState::Inactive,
            "active" => JobState::Active,
            "failed" => JobState::Failed,
            "finished" => JobState::Finished,
            other => unreachable!("unknown job state in storage: {other}"),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A durable unit of deferred work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub task: String,
    pub args: Value,
    pub queue: String,
    pub priority: i32,
    pub state: JobState,
    pub attempts: i32,
    pub retries: i32,
    pub delayed: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
    pub lax: bool,
    pub parents: Vec<i64>,
    pub notes: Map<String, Value>,
    pub result: Option<Value>,
    pub worker: Option<i64>,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub retried: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
}

/// The `{id, args, retries, task}` tuple `dequeue` hands back to a worker.
#[derive(Debug, Clone)]
pub struct DequeuedJob {
    pub id: i64,
    pub task: String,
    pub args: Value,
    pub retries: i32,
}

/// A process registered to pull jobs.
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: i64,
    pub host: String,
    pub pid: i64,
    pub started: DateTime<Utc>,
    pub notified: DateTime<Utc>,
    pub status: Map<String, Value>,
    pub inbox: Vec<Vec<Value>>,
}

/// A named lease.
#[derive(Debug, Clone)]
pub struct Lock {
    pub id: i64,
    pub name: String,
    pub expires: DateTime<Utc>,
}

/// Options accepted by [`crate::Backend::enqueue`].
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub attempts: i32,
    pub delay: i64,
    pub expire: Option<i64>,
    pub lax: bool,
    pub notes: Map<String, Value>,
    pub parents: Vec<i64>,
    pub priority: i32,
    pub queue: String,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay: 0,
            expire: None,
            lax: false,
            notes: Map::new(),
            parents: Vec::new(),
            priority: 0,
            queue: "default".to_string(),
        }
    }
}

/// Options accepted by [`crate::Backend::dequeue`].
#[derive(Debug, Clone)]
pub struct DequeueOptions {
    pub id: Option<i64>,
    pub queues: Vec<String>,
}

impl Default for DequeueOptions {
    fn default() -> Self {
        Self {
            id: None,
            queues: vec!["default".to_string()],
        }
    }
}

/// Overrides accepted by [`crate::Backend::retry_job`]. `None` means "keep
/// the job's existing value"; only `delay` has no existing-value fallback,
/// since retry always recomputes `delayed` from it (default: retry now).
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub delay: i64,
    pub attempts: Option<i32>,
    pub expire: Option<i64>,
    pub lax: Option<bool>,
    pub parents: Option<Vec<i64>>,
    pub priority: Option<i32>,
    pub queue: Option<String>,
}

/// Filter accepted by [`crate::Backend::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct ListJobsFilter {
    pub before: Option<i64>,
    pub ids: Option<Vec<i64>>,
    pub queues: Option<Vec<String>>,
    pub states: Option<Vec<JobState>>,
    pub tasks: Option<Vec<String>>,
}

/// Filter accepted by [`crate::Backend::list_workers`].
#[derive(Debug, Clone, Default)]
pub struct ListWorkersFilter {
    pub before: Option<i64>,
    pub ids: Option<Vec<i64>>,
}

/// Filter accepted by [`crate::Backend::list_locks`].
#[derive(Debug, Clone, Default)]
pub struct ListLocksFilter {
    pub names: Option<Vec<String>>,
}

/// A page of results plus the total count matching the filter, pre-paging.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: i64,
}

/// Aggregated counters returned by [`crate::Backend::stats`] (§6.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub active_jobs: i64,
    pub inactive_jobs: i64,
    pub active_workers: i64,
    pub inactive_workers: i64,
    pub failed_jobs: i64,
    pub finished_jobs: i64,
    pub delayed_jobs: i64,
    pub active_locks: i64,
    pub enqueued_jobs: i64,
    pub uptime: i64,
}

/// One hourly bucket of [`crate::Backend::history`].
#[derive(Debug, Clone, Copy)]
pub struct HistoryBucket {
    pub epoch: i64,
    pub finished_jobs: i64,
    pub failed_jobs: i64,
}

/// `history()`'s result: always exactly 24 hourly buckets (P6).
#[derive(Debug, Clone)]
pub struct History {
    pub daily: Vec<HistoryBucket>,
}

/// Scope accepted by [`crate::Backend::reset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    /// Wipe everything: jobs, workers, and locks, and restart id sequences.
    pub all: bool,
    /// Wipe locks only.
    pub locks: bool,
}
