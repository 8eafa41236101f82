use chrono::{Duration as ChronoDuration, Utc};
use tracing::instrument;

use crate::backend::Backend;
use crate::codec;
use crate::error::Result;
use crate::model::EnqueueOptions;

impl Backend {
    /// Insert a new job in state `inactive` and return its id (§4.1).
    ///
    /// `expires` is computed once in application code as `now + expire`
    /// and bound a single time, regardless of how a reference
    /// implementation's query might bind the same parameter twice
    /// (§9, open question).
    #[instrument(skip(self, args, options), fields(task = %task))]
    pub async fn enqueue(
        &self,
        task: &str,
        args: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<i64> {
        let now = Utc::now();
        let delayed = now + ChronoDuration::seconds(options.delay);
        let expires = options
            .expire
            .map(|secs| now + ChronoDuration::seconds(secs));

        let args_text = codec::encode(&args)?;
        let parents_text = codec::encode_ids(&options.parents)?;
        let notes_text = codec::encode(&serde_json::Value::Object(options.notes))?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO minion_jobs
                (task, args, queue, priority, attempts, delayed, expires, lax, parents, notes, created)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING id
            "#,
        )
        .bind(task)
        .bind(args_text)
        .bind(&options.queue)
        .bind(options.priority)
        .bind(options.attempts)
        .bind(delayed)
        .bind(expires)
        .bind(options.lax)
        .bind(parents_text)
        .bind(notes_text)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        tracing::debug!(job_id = id, queue = %options.queue, "enqueued job");

        Ok(id)
    }
}
