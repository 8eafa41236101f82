//! Covers P1: concurrent dequeues never hand the same job to two workers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use minion_queue::DequeueOptions;

#[tokio::test]
async fn concurrent_workers_never_claim_the_same_job_twice() {
    let backend = minion_queue_testing::setup().await;

    const JOB_COUNT: usize = 40;
    const WORKER_COUNT: usize = 8;

    for i in 0..JOB_COUNT {
        minion_queue_testing::enqueue(&backend, &format!("job-{i}")).await;
    }

    let claimed: Arc<Mutex<HashSet<i64>>> = Arc::new(Mutex::new(HashSet::new()));
    let duplicate_found = Arc::new(Mutex::new(false));

    let tasks: Vec<String> = (0..JOB_COUNT).map(|i| format!("job-{i}")).collect();

    let mut handles = Vec::new();
    for worker_idx in 0..WORKER_COUNT {
        let backend = backend.clone();
        let claimed = claimed.clone();
        let duplicate_found = duplicate_found.clone();
        let tasks = tasks.clone();

        handles.push(tokio::spawn(async move {
            let worker_id = minion_queue_testing::register_worker(
                &backend,
                &format!("worker-{worker_idx}"),
            )
            .await;

            loop {
                let job = backend
                    .dequeue(worker_id, Duration::ZERO, &tasks, DequeueOptions::default())
                    .await
                    .unwrap();

                let Some(job) = job else {
                    break;
                };

                let mut seen = claimed.lock().unwrap();
                if !seen.insert(job.id) {
                    *duplicate_found.lock().unwrap() = true;
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(!*duplicate_found.lock().unwrap(), "a job was dequeued twice");
    assert_eq!(claimed.lock().unwrap().len(), JOB_COUNT);
}
