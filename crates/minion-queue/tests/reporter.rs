//! Covers stats, history, listing, and notes (P3, P6, P7, P8).

use std::time::Duration;

use minion_queue::{DequeueOptions, EnqueueOptions};
use serde_json::{json, Map, Value};

#[tokio::test]
async fn stats_reflect_job_and_worker_state_counts() {
    let backend = minion_queue_testing::setup().await;
    let worker = minion_queue_testing::register_worker(&backend, "host-a").await;

    minion_queue_testing::enqueue(&backend, "idle").await;
    let active_id = minion_queue_testing::enqueue(&backend, "busy").await;

    let job = backend
        .dequeue(
            worker,
            Duration::ZERO,
            &["busy".to_string()],
            DequeueOptions::default(),
        )
        .await
        .unwrap()
        .expect("busy job dequeues");
    assert_eq!(job.id, active_id);

    let stats = backend.stats().await.unwrap();
    assert_eq!(stats.inactive_jobs, 1);
    assert_eq!(stats.active_jobs, 1);
    assert_eq!(stats.active_workers, 1);
    assert_eq!(stats.inactive_workers, 0);
    assert_eq!(stats.enqueued_jobs, 2);
}

#[tokio::test]
async fn history_always_has_24_hourly_buckets() {
    let backend = minion_queue_testing::setup().await;
    let history = backend.history().await.unwrap();

    assert_eq!(history.daily.len(), 24);
    for pair in history.daily.windows(2) {
        assert_eq!(pair[1].epoch - pair[0].epoch, 3600);
    }
}

#[tokio::test]
async fn list_jobs_total_matches_enqueued_count() {
    let backend = minion_queue_testing::setup().await;
    for task in ["a", "b", "c"] {
        minion_queue_testing::enqueue(&backend, task).await;
    }

    let page = backend
        .list_jobs(0, 2, Default::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.rows.len(), 2);

    // Newest first.
    assert!(page.rows[0].id > page.rows[1].id);
}

#[tokio::test]
async fn note_set_then_null_removes_key_and_preserves_others() {
    let backend = minion_queue_testing::setup().await;
    let id = minion_queue_testing::enqueue(&backend, "annotated").await;

    let mut first = Map::new();
    first.insert("progress".to_string(), json!(10));
    first.insert("stage".to_string(), json!("start"));
    assert!(backend.note(id, first).await.unwrap());

    let mut second = Map::new();
    second.insert("progress".to_string(), Value::Null);
    assert!(backend.note(id, second).await.unwrap());

    let page = backend
        .list_jobs(
            0,
            1,
            minion_queue::ListJobsFilter {
                ids: Some(vec![id]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let job = &page.rows[0];
    assert_eq!(job.notes.get("progress"), None);
    assert_eq!(job.notes.get("stage"), Some(&json!("start")));
}

#[tokio::test]
async fn note_on_missing_job_returns_false() {
    let backend = minion_queue_testing::setup().await;
    let mut updates = Map::new();
    updates.insert("k".to_string(), json!(1));
    assert!(!backend.note(9999, updates).await.unwrap());
}
