//! # Worker Demo
//!
//! Shows how to drive `minion-queue` directly: connect, enqueue a couple of
//! jobs, register a worker, and dequeue-execute-finish in a loop. No job
//! runner, no process forking - just the library calls a worker loop would
//! make around whatever executes the actual task.

use std::time::Duration;

use anyhow::Result;
use minion_queue::{Backend, BackendConfig, DequeueOptions, EnqueueOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let database_url =
        std::env::var("MINION_DATABASE_URL").unwrap_or_else(|_| "sqlite://worker-demo.db".into());
    let config = BackendConfig::builder(database_url).build();
    let backend = Backend::connect(config).await?;

    let greet_id = backend
        .enqueue(
            "greet",
            json!({"name": "Ada"}),
            EnqueueOptions {
                queue: "default".into(),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!(job_id = greet_id, "enqueued greet job");

    let flaky_id = backend
        .enqueue(
            "greet",
            json!({"name": "Grace"}),
            EnqueueOptions {
                attempts: 3,
                ..Default::default()
            },
        )
        .await?;
    tracing::info!(job_id = flaky_id, "enqueued retryable greet job");

    let worker_id = backend
        .register_worker(
            None,
            &hostname(),
            std::process::id() as i64,
            Default::default(),
        )
        .await?;
    tracing::info!(worker_id, "worker registered");

    let tasks = vec!["greet".to_string()];
    loop {
        let job = backend
            .dequeue(
                worker_id,
                Duration::from_secs(2),
                &tasks,
                DequeueOptions::default(),
            )
            .await?;

        let Some(job) = job else {
            tracing::info!("no more jobs, exiting");
            break;
        };

        tracing::info!(job_id = job.id, task = %job.task, args = %job.args, "running job");
        match run_greet(&job.args) {
            Ok(result) => {
                backend.finish_job(job.id, job.retries, Some(result)).await?;
            }
            Err(err) => {
                backend
                    .fail_job(job.id, job.retries, Some(json!(err.to_string())))
                    .await?;
            }
        }
    }

    backend.unregister_worker(worker_id).await?;
    Ok(())
}

fn run_greet(args: &serde_json::Value) -> Result<serde_json::Value> {
    let name = args
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'name' arg"))?;
    Ok(json!(format!("Hello, {name}!")))
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
