use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::Row;
use tracing::instrument;

use crate::backend::Backend;
use crate::codec;
use crate::error::Result;

impl Backend {
    /// Register a new worker, or heartbeat an existing one by id (§4.5).
    /// If `id` is given but no such row exists, falls back to inserting a
    /// fresh row (matching the spec's "if id is given and the row exists
    /// ... else insert").
    #[instrument(skip(self, status), fields(host = %host))]
    pub async fn register_worker(
        &self,
        id: Option<i64>,
        host: &str,
        pid: i64,
        status: Map<String, Value>,
    ) -> Result<i64> {
        let now = Utc::now();
        let status_text = codec::encode(&Value::Object(status))?;

        if let Some(id) = id {
            let updated = sqlx::query(
                "UPDATE minion_workers SET notified = ?, status = ? WHERE id = ?",
            )
            .bind(now)
            .bind(&status_text)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();

            if updated == 1 {
                tracing::debug!(worker_id = id, "worker heartbeat");
                return Ok(id);
            }
        }

        let new_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO minion_workers (host, pid, started, notified, status)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(host)
        .bind(pid)
        .bind(now)
        .bind(now)
        .bind(status_text)
        .fetch_one(self.pool())
        .await?;

        tracing::debug!(worker_id = new_id, "worker registered");
        Ok(new_id)
    }

    /// Delete a worker's row. Any jobs it had claimed become orphaned and
    /// are left for `repair` to reclaim (§4.5, §9).
    #[instrument(skip(self))]
    pub async fn unregister_worker(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM minion_workers WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Append `[command, ...args]` to the inbox of every targeted worker,
    /// or every worker if `ids` is empty (§4.5). Returns whether at least
    /// one worker's inbox was updated.
    #[instrument(skip(self, args), fields(command = %command))]
    pub async fn broadcast(&self, command: &str, args: Vec<Value>, ids: &[i64]) -> Result<bool> {
        let mut message = vec![Value::String(command.to_string())];
        message.extend(args);
        let message_text = codec::encode(&Value::Array(message))?;

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "UPDATE minion_workers SET inbox = json_insert(inbox, '$[#]', json(",
        );
        builder.push_bind(message_text);
        builder.push("))");

        if !ids.is_empty() {
            builder.push(" WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            builder.push(")");
        }

        let rows_affected = builder.build().execute(self.pool()).await?.rows_affected();
        Ok(rows_affected > 0)
    }

    /// Atomically read and clear a worker's inbox (§4.5). Uses an explicit
    /// transaction (§5: "read-modify-write ... to avoid dropping
    /// commands") since the read and the clear are two statements that
    /// must not interleave with a concurrent `broadcast`.
    #[instrument(skip(self))]
    pub async fn receive(&self, worker_id: i64) -> Result<Vec<Vec<Value>>> {
        let mut conn = self.begin_immediate().await?;

        let result: Result<Vec<Vec<Value>>> = async {
            let row = sqlx::query("SELECT inbox FROM minion_workers WHERE id = ?")
                .bind(worker_id)
                .fetch_optional(&mut *conn)
                .await?;

            let inbox = match row {
                Some(row) => {
                    let text: String = row.try_get("inbox")?;
                    codec::decode_inbox(&text)?
                }
                None => Vec::new(),
            };

            sqlx::query("UPDATE minion_workers SET inbox = '[]' WHERE id = ?")
                .bind(worker_id)
                .execute(&mut *conn)
                .await?;

            Ok(inbox)
        }
        .await;

        match result {
            Ok(inbox) => {
                Backend::commit(&mut conn).await?;
                Ok(inbox)
            }
            Err(err) => {
                Backend::rollback(&mut conn).await;
                Err(err)
            }
        }
    }
}
