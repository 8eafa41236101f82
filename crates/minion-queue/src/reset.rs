use tracing::instrument;

use crate::backend::Backend;
use crate::error::Result;
use crate::model::ResetOptions;

impl Backend {
    /// Wipe state for tests and local development (§6.2). `locks` wipes
    /// only `minion_locks`; `all` wipes jobs, workers, and locks and resets
    /// the id sequences so a fresh run starts from id 1 again. Neither flag
    /// set is a no-op.
    #[instrument(skip(self))]
    pub async fn reset(&self, options: ResetOptions) -> Result<()> {
        if options.all {
            sqlx::query("DELETE FROM minion_jobs")
                .execute(self.pool())
                .await?;
            sqlx::query("DELETE FROM minion_workers")
                .execute(self.pool())
                .await?;
            sqlx::query("DELETE FROM minion_locks")
                .execute(self.pool())
                .await?;
            sqlx::query(
                "DELETE FROM sqlite_sequence WHERE name IN ('minion_jobs', 'minion_workers', 'minion_locks')",
            )
            .execute(self.pool())
            .await?;
            tracing::info!("reset: wiped jobs, workers, and locks");
        } else if options.locks {
            sqlx::query("DELETE FROM minion_locks")
                .execute(self.pool())
                .await?;
            tracing::info!("reset: wiped locks");
        }

        Ok(())
    }
}
