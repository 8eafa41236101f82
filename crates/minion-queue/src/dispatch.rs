use std::time::Duration as StdDuration;

use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite};
use tokio::time::sleep;
use tracing::instrument;

use crate::backend::Backend;
use crate::codec;
use crate::error::Result;
use crate::model::{DequeueOptions, DequeuedJob};

impl Backend {
    /// Select and claim the next eligible job, or return `None` if no job
    /// is currently eligible (§4.2.1). One atomic `UPDATE ... WHERE id =
    /// (SELECT ...)` statement serves the role the spec describes as "one
    /// exclusive transaction": SQLite only ever has one writer active at a
    /// time, so a single statement already observes a consistent snapshot
    /// no other connection can interleave with (I5).
    #[instrument(skip(self, tasks, options), fields(worker_id))]
    async fn try_dequeue(
        &self,
        worker_id: i64,
        tasks: &[String],
        options: &DequeueOptions,
    ) -> Result<Option<DequeuedJob>> {
        if tasks.is_empty() || options.queues.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            UPDATE minion_jobs
            SET state = 'active', worker = "#,
        );
        builder.push_bind(worker_id);
        builder.push(", started = ");
        builder.push_bind(now);
        builder.push(
            r#"
            WHERE id = (
                SELECT j.id
                FROM minion_jobs j
                WHERE j.state = 'inactive'
                  AND j.delayed <= "#,
        );
        builder.push_bind(now);
        builder.push(" AND (j.expires IS NULL OR j.expires > ");
        builder.push_bind(now);
        builder.push(") AND j.queue IN (");
        push_string_list(&mut builder, &options.queues);
        builder.push(") AND j.task IN (");
        push_string_list(&mut builder, tasks);
        builder.push(")");

        if let Some(id) = options.id {
            builder.push(" AND j.id = ");
            builder.push_bind(id);
        }

        builder.push(
            r#"
                  AND NOT EXISTS (
                    SELECT 1
                    FROM json_each(j.parents) pe
                    JOIN minion_jobs p ON p.id = pe.value
                    WHERE p.state = 'active'
                       OR (p.state = 'failed' AND j.lax = 0)
                       OR (p.state = 'inactive' AND (p.expires IS NULL OR p.expires > "#,
        );
        builder.push_bind(now);
        builder.push(
            r#"))
                  )
                ORDER BY j.priority DESC, j.id ASC
                LIMIT 1
            )
            RETURNING id, task, args, retries
            "#,
        );

        let row = builder.build().fetch_optional(self.pool()).await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let args_text: String = row.try_get("args")?;
        let job = DequeuedJob {
            id: row.try_get("id")?,
            task: row.try_get("task")?,
            args: codec::decode(&args_text)?,
            retries: row.try_get("retries")?,
        };

        tracing::debug!(job_id = job.id, task = %job.task, "dequeued job");

        Ok(Some(job))
    }

    /// Poll for up to `wait` for an eligible job, attempting immediately,
    /// then sleeping `min(dequeue_interval, remaining)` between attempts,
    /// with one final attempt exactly at the deadline (§4.2, §4.2.2).
    #[instrument(skip(self, tasks, options))]
    pub async fn dequeue(
        &self,
        worker_id: i64,
        wait: StdDuration,
        tasks: &[String],
        options: DequeueOptions,
    ) -> Result<Option<DequeuedJob>> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(job) = self.try_dequeue(worker_id, tasks, &options).await? {
                return Ok(Some(job));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let remaining = deadline - now;
            let step = self.config().dequeue_interval.min(remaining);
            sleep(step).await;
        }
    }
}

fn push_string_list(builder: &mut QueryBuilder<Sqlite>, values: &[String]) {
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.clone());
    }
}
