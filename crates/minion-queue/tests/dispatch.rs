//! Covers the dequeue ordering and dependency scenarios (E1-E4).

use std::time::Duration;

use minion_queue::{DequeueOptions, EnqueueOptions};
use serde_json::json;

#[tokio::test]
async fn dequeues_fifo_within_equal_priority() {
    let backend = minion_queue_testing::setup().await;
    let worker = minion_queue_testing::register_worker(&backend, "host-a").await;

    let foo_id = minion_queue_testing::enqueue(&backend, "foo").await;
    let bar_id = minion_queue_testing::enqueue(&backend, "bar").await;

    let tasks = vec!["foo".to_string(), "bar".to_string()];
    let first = backend
        .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
        .await
        .unwrap()
        .expect("first job");
    let second = backend
        .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
        .await
        .unwrap()
        .expect("second job");

    assert_eq!(first.id, foo_id);
    assert_eq!(second.id, bar_id);
}

#[tokio::test]
async fn higher_priority_dequeues_first() {
    let backend = minion_queue_testing::setup().await;
    let worker = minion_queue_testing::register_worker(&backend, "host-a").await;

    let low_id = backend
        .enqueue(
            "job",
            json!(null),
            EnqueueOptions {
                priority: 0,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let high_id = backend
        .enqueue(
            "job",
            json!(null),
            EnqueueOptions {
                priority: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tasks = vec!["job".to_string()];
    let first = backend
        .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
        .await
        .unwrap()
        .expect("a job");

    assert_eq!(first.id, high_id);
    assert_ne!(first.id, low_id);
}

#[tokio::test]
async fn child_waits_for_parent_and_unblocks_on_finish() {
    let backend = minion_queue_testing::setup().await;
    let worker = minion_queue_testing::register_worker(&backend, "host-a").await;

    let parent_id = minion_queue_testing::enqueue(&backend, "parent").await;
    let child_id = backend
        .enqueue(
            "child",
            json!(null),
            EnqueueOptions {
                parents: vec![parent_id],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tasks = vec!["parent".to_string(), "child".to_string()];

    let first = backend
        .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
        .await
        .unwrap()
        .expect("parent job");
    assert_eq!(first.id, parent_id);

    assert!(
        backend
            .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
            .await
            .unwrap()
            .is_none(),
        "child must not dequeue before its parent finishes"
    );

    assert!(backend.finish_job(parent_id, first.retries, None).await.unwrap());

    let second = backend
        .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
        .await
        .unwrap()
        .expect("child job");
    assert_eq!(second.id, child_id);
}

#[tokio::test]
async fn non_lax_child_never_dequeues_after_parent_fails() {
    let backend = minion_queue_testing::setup().await;
    let worker = minion_queue_testing::register_worker(&backend, "host-a").await;

    let parent_id = minion_queue_testing::enqueue(&backend, "parent").await;
    backend
        .enqueue(
            "child",
            json!(null),
            EnqueueOptions {
                parents: vec![parent_id],
                lax: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tasks = vec!["parent".to_string(), "child".to_string()];
    let parent_job = backend
        .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
        .await
        .unwrap()
        .expect("parent job");
    assert!(backend
        .fail_job(parent_job.id, parent_job.retries, None)
        .await
        .unwrap());

    assert!(
        backend
            .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
            .await
            .unwrap()
            .is_none(),
        "non-lax child must never dequeue once its parent has failed"
    );
}

#[tokio::test]
async fn delayed_job_is_invisible_until_its_time_arrives() {
    let backend = minion_queue_testing::setup().await;
    let worker = minion_queue_testing::register_worker(&backend, "host-a").await;

    let id = backend
        .enqueue(
            "late",
            json!(null),
            EnqueueOptions {
                delay: 100,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tasks = vec!["late".to_string()];
    assert!(
        backend
            .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
            .await
            .unwrap()
            .is_none(),
        "a job delayed into the future must not dequeue yet"
    );

    // Simulate the delay elapsing by retrying with no delay, which rewrites
    // `delayed` back to now.
    assert!(backend
        .retry_job(id, 0, minion_queue::RetryOptions::default())
        .await
        .unwrap());

    let job = backend
        .dequeue(worker, Duration::ZERO, &tasks, DequeueOptions::default())
        .await
        .unwrap()
        .expect("job should now be eligible");
    assert_eq!(job.id, id);
}
