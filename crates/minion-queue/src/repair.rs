use chrono::Utc;
use serde_json::json;
use sqlx::Row;
use tracing::instrument;

use crate::backend::Backend;
use crate::codec;
use crate::error::Result;

/// The queue name reserved for synchronous/foreground job execution.
/// Jobs run this way are driven directly by their own process rather than
/// dispatched to a worker pool, so a missing worker row never indicates an
/// orphaned job for them - `repair` leaves this queue alone in R3 (§4.7).
pub const FOREGROUND_QUEUE: &str = "minion_foreground";

/// Counters from one `repair()` sweep, logged as a structured event so
/// operators can alert on repair activity without parsing free text
/// (§4.10).
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairSummary {
    pub workers_expired: u64,
    pub jobs_removed: u64,
    pub jobs_reclaimed: u64,
    pub jobs_stuck: u64,
}

impl Backend {
    /// Run one maintenance sweep: expire dead workers, remove old terminal
    /// jobs and expired inactive jobs, reclaim jobs whose worker vanished,
    /// and force-fail jobs stuck past `stuck_after` (§4.7).
    #[instrument(skip(self))]
    pub async fn repair(&self) -> Result<RepairSummary> {
        let now = Utc::now();
        let mut summary = RepairSummary::default();

        // R1: expire workers that haven't heartbeat recently enough.
        let missing_cutoff = now - self.config().missing_after;
        summary.workers_expired = sqlx::query("DELETE FROM minion_workers WHERE notified < ?")
            .bind(missing_cutoff)
            .execute(self.pool())
            .await?
            .rows_affected();

        // R2: remove old finished jobs with no non-finished dependent, and
        // expired inactive jobs.
        let remove_cutoff = now - self.config().remove_after;
        let removed_finished = sqlx::query(
            r#"
            DELETE FROM minion_jobs AS j
            WHERE j.state = 'finished'
              AND j.finished <= ?
              AND NOT EXISTS (
                  SELECT 1 FROM minion_jobs c, json_each(c.parents) pe
                  WHERE pe.value = j.id AND c.state != 'finished'
              )
            "#,
        )
        .bind(remove_cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        let removed_expired = sqlx::query(
            r#"
            DELETE FROM minion_jobs
            WHERE state = 'inactive' AND expires IS NOT NULL AND expires <= ?
            "#,
        )
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();

        summary.jobs_removed = removed_finished + removed_expired;

        // R3: reclaim active jobs whose worker no longer exists.
        let orphans = sqlx::query(
            r#"
            SELECT id, retries
            FROM minion_jobs
            WHERE state = 'active'
              AND queue != ?
              AND worker IS NOT NULL
              AND worker NOT IN (SELECT id FROM minion_workers)
            "#,
        )
        .bind(FOREGROUND_QUEUE)
        .fetch_all(self.pool())
        .await?;

        for row in orphans {
            let id: i64 = row.try_get("id")?;
            let retries: i32 = row.try_get("retries")?;
            if self
                .fail_job(id, retries, Some(json!("Worker went away")))
                .await?
            {
                summary.jobs_reclaimed += 1;
            }
        }

        // R4: force-fail jobs stuck in the queue past `stuck_after`. Not
        // auto-retried, to avoid oscillation (§9, open question).
        let stuck_cutoff = now - self.config().stuck_after;
        let result_text = codec::encode(&json!("Job appears stuck in queue"))?;
        summary.jobs_stuck = sqlx::query(
            r#"
            UPDATE minion_jobs
            SET state = 'failed', finished = ?, result = ?
            WHERE state = 'inactive' AND delayed < ?
            "#,
        )
        .bind(now)
        .bind(result_text)
        .bind(stuck_cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        tracing::info!(
            workers_expired = summary.workers_expired,
            jobs_removed = summary.jobs_removed,
            jobs_reclaimed = summary.jobs_reclaimed,
            jobs_stuck = summary.jobs_stuck,
            "repair swept"
        );

        Ok(summary)
    }
}
