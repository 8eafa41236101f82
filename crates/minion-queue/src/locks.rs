use chrono::{Duration as ChronoDuration, Utc};
use sqlx::Row;
use tracing::instrument;

use crate::backend::Backend;
use crate::error::Result;

impl Backend {
    /// Acquire a named counted lease (§4.6). `duration` of `0` or less
    /// checks feasibility only and never inserts a row. Expired locks are
    /// swept before the count is taken, so a lock that just expired
    /// doesn't count against `limit`.
    ///
    /// The count-then-insert is expressed as a single
    /// `INSERT ... SELECT ... WHERE` statement rather than a separate
    /// read followed by a conditional write, so the check and the
    /// insert commit as one indivisible step (I6) without needing an
    /// explicit transaction block.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn lock(&self, name: &str, duration: i64, limit: i32) -> Result<bool> {
        let now = Utc::now();

        sqlx::query("DELETE FROM minion_locks WHERE expires <= ?")
            .bind(now)
            .execute(self.pool())
            .await?;

        if duration <= 0 {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM minion_locks WHERE name = ? AND expires > ?",
            )
            .bind(name)
            .bind(now)
            .fetch_one(self.pool())
            .await?;

            return Ok(count < limit as i64);
        }

        let expires = now + ChronoDuration::seconds(duration);

        let rows_affected = sqlx::query(
            r#"
            INSERT INTO minion_locks (name, expires)
            SELECT ?, ?
            WHERE (SELECT COUNT(*) FROM minion_locks WHERE name = ? AND expires > ?) < ?
            "#,
        )
        .bind(name)
        .bind(expires)
        .bind(name)
        .bind(now)
        .bind(limit)
        .execute(self.pool())
        .await?
        .rows_affected();

        tracing::debug!(name, acquired = rows_affected == 1, "lock");
        Ok(rows_affected == 1)
    }

    /// Release one non-expired lease for `name`, preferring the
    /// earliest-expiring holder (§4.6). Returns whether a row was deleted.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn unlock(&self, name: &str) -> Result<bool> {
        let now = Utc::now();

        let rows_affected = sqlx::query(
            r#"
            DELETE FROM minion_locks
            WHERE id = (
                SELECT id FROM minion_locks
                WHERE name = ? AND expires > ?
                ORDER BY expires ASC
                LIMIT 1
            )
            "#,
        )
        .bind(name)
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    /// Acquire `name` and return an RAII guard that releases it on drop,
    /// best-effort, or via explicit [`LockGuard::release`] (§4.6, §9).
    /// Returns `Ok(None)` if the lock could not be acquired.
    pub async fn with_lock(
        &self,
        name: &str,
        duration: i64,
        limit: i32,
    ) -> Result<Option<LockGuard>> {
        if self.lock(name, duration, limit).await? {
            Ok(Some(LockGuard {
                backend: self.clone(),
                name: name.to_string(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Scoped handle on an acquired lock (§9, "Scoped lock guards"). Releasing
/// is guaranteed on any exit path: either explicitly via [`Self::release`],
/// or best-effort on drop by spawning the unlock onto the runtime.
pub struct LockGuard {
    backend: Backend,
    name: String,
    released: bool,
}

impl LockGuard {
    /// Release the lock now and observe whether it actually released.
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        self.backend.unlock(&self.name).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let backend = self.backend.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            if let Err(err) = backend.unlock(&name).await {
                tracing::warn!(%name, %err, "failed to release lock on drop");
            }
        });
    }
}
