use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use sqlx::Row;
use tracing::instrument;

use crate::backend::Backend;
use crate::codec;
use crate::error::Result;
use crate::model::RetryOptions;

impl Backend {
    /// Transition an `active` job to `finished` (§4.3). Returns `false`,
    /// never an error, if the row wasn't in the expected `(id, retries,
    /// active)` state - e.g. it was already reclaimed by `repair`.
    #[instrument(skip(self, result))]
    pub async fn finish_job(&self, id: i64, retries: i32, result: Option<Value>) -> Result<bool> {
        let result_text = match &result {
            Some(value) => Some(codec::encode(value)?),
            None => None,
        };

        let rows_affected = sqlx::query(
            r#"
            UPDATE minion_jobs
            SET state = 'finished', finished = ?, result = ?
            WHERE id = ? AND retries = ? AND state = 'active'
            "#,
        )
        .bind(Utc::now())
        .bind(result_text)
        .bind(id)
        .bind(retries)
        .execute(self.pool())
        .await?
        .rows_affected();

        tracing::debug!(job_id = id, updated = rows_affected == 1, "finish_job");

        Ok(rows_affected == 1)
    }

    /// Transition an `active` job to `failed` (§4.3). If attempts remain
    /// (`retries < attempts - 1`), immediately re-enqueues it via the same
    /// retry path `retry_job` uses, delayed by `backoff(retries)`.
    #[instrument(skip(self, result))]
    pub async fn fail_job(&self, id: i64, retries: i32, result: Option<Value>) -> Result<bool> {
        let result_text = match &result {
            Some(value) => Some(codec::encode(value)?),
            None => None,
        };

        let row = sqlx::query(
            r#"
            UPDATE minion_jobs
            SET state = 'failed', finished = ?, result = ?
            WHERE id = ? AND retries = ? AND state = 'active'
            RETURNING attempts
            "#,
        )
        .bind(Utc::now())
        .bind(result_text)
        .bind(id)
        .bind(retries)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            tracing::debug!(job_id = id, "fail_job: no matching active row");
            return Ok(false);
        };

        let attempts: i32 = row.try_get("attempts")?;
        if retries < attempts - 1 {
            let delay = (self.config().backoff)(retries);
            tracing::warn!(job_id = id, retries, delay, "job failed, auto-retrying");
            self.apply_retry(
                id,
                retries,
                RetryOptions {
                    delay,
                    ..Default::default()
                },
            )
            .await?;
        } else {
            tracing::warn!(job_id = id, retries, attempts, "job failed, no attempts remaining");
        }

        Ok(true)
    }

    /// Conditionally return a job to `inactive`, keyed on `(id, retries)`
    /// so a retry racing a concurrent dispatch or another retry is a no-op
    /// (§4.4).
    #[instrument(skip(self, options))]
    pub async fn retry_job(&self, id: i64, retries: i32, options: RetryOptions) -> Result<bool> {
        self.apply_retry(id, retries, options).await
    }

    pub(crate) async fn apply_retry(
        &self,
        id: i64,
        retries: i32,
        options: RetryOptions,
    ) -> Result<bool> {
        let now = Utc::now();
        let delayed = now + ChronoDuration::seconds(options.delay);
        let expires = options
            .expire
            .map(|secs| now + ChronoDuration::seconds(secs));
        let parents_text = match &options.parents {
            Some(ids) => Some(codec::encode_ids(ids)?),
            None => None,
        };

        let rows_affected = sqlx::query(
            r#"
            UPDATE minion_jobs
            SET state = 'inactive',
                retries = retries + 1,
                retried = ?,
                delayed = ?,
                attempts = COALESCE(?, attempts),
                expires = COALESCE(?, expires),
                lax = COALESCE(?, lax),
                parents = COALESCE(?, parents),
                priority = COALESCE(?, priority),
                queue = COALESCE(?, queue)
            WHERE id = ? AND retries = ?
            "#,
        )
        .bind(now)
        .bind(delayed)
        .bind(options.attempts)
        .bind(expires)
        .bind(options.lax)
        .bind(parents_text)
        .bind(options.priority)
        .bind(options.queue)
        .bind(id)
        .bind(retries)
        .execute(self.pool())
        .await?
        .rows_affected();

        tracing::debug!(job_id = id, updated = rows_affected == 1, "retry_job");

        Ok(rows_affected == 1)
    }

    /// Delete a job, but only from a terminal or not-yet-started state
    /// (§6.2) - an `active` job must be finished, failed, or reclaimed by
    /// `repair` first.
    #[instrument(skip(self))]
    pub async fn remove_job(&self, id: i64) -> Result<bool> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM minion_jobs
            WHERE id = ? AND state IN ('inactive', 'failed', 'finished')
            "#,
        )
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }
}
