//! A persistent job queue backed by a single SQLite file.
//!
//! `minion-queue` is the storage and coordination layer for a distributed
//! background-job system: every worker and producer process embeds it
//! directly and talks to the same database file, so competing workers never
//! run the same job at the same time and a crashed worker's jobs are always
//! recoverable.
//!
//! This crate owns schema migrations, the job/worker/lock tables, and the
//! enqueue/dispatch/completion/repair operations built on top of them. It
//! does not run jobs itself, does not fork worker processes, and does not
//! expose an HTTP interface - those are the concern of whatever embeds this
//! crate.
//!
//! ```no_run
//! use minion_queue::{Backend, BackendConfig, DequeueOptions, EnqueueOptions};
//!
//! # async fn example() -> minion_queue::Result<()> {
//! let config = BackendConfig::builder("sqlite://jobs.db").build();
//! let backend = Backend::connect(config).await?;
//!
//! let id = backend
//!     .enqueue("send_email", serde_json::json!({"to": "a@example.com"}), EnqueueOptions::default())
//!     .await?;
//!
//! let worker_id = backend
//!     .register_worker(None, "localhost", std::process::id() as i64, Default::default())
//!     .await?;
//!
//! if let Some(job) = backend
//!     .dequeue(worker_id, std::time::Duration::from_secs(5), &["send_email".to_string()], DequeueOptions::default())
//!     .await?
//! {
//!     backend.finish_job(job.id, job.retries, None).await?;
//! }
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

mod backend;
mod codec;
mod completion;
mod config;
mod dispatch;
mod enqueue;
mod error;
mod locks;
mod model;
mod registry;
mod repair;
mod reporter;
mod reset;

pub use backend::Backend;
pub use config::{BackendConfig, BackendConfigBuilder, BackoffFn};
pub use error::{BackendError, Result};
pub use locks::LockGuard;
pub use model::{
    DequeueOptions, DequeuedJob, EnqueueOptions, History, HistoryBucket, Job, JobState,
    ListJobsFilter, ListLocksFilter, ListWorkersFilter, Lock, Page, ResetOptions, RetryOptions,
    Stats, Worker,
};
pub use repair::{RepairSummary, FOREGROUND_QUEUE};
