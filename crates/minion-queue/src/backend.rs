use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use tracing::instrument;

use crate::config::BackendConfig;
use crate::error::Result;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations");

/// The persistent-queue backend. One instance wraps one SQLite connection
/// pool; each OS process embedding the backend opens its own instance
/// against the same database file (§5).
#[derive(Clone)]
pub struct Backend {
    pub(crate) pool: SqlitePool,
    pub(crate) config: BackendConfig,
    started_at: DateTime<Utc>,
}

impl Backend {
    /// Open the database, configure it for multi-process access, and apply
    /// any outstanding migrations.
    #[instrument(skip(config), fields(database_url = %config.database_url))]
    pub async fn connect(config: BackendConfig) -> Result<Self> {
        let connect_options: SqliteConnectOptions = config
            .database_url
            .parse::<SqliteConnectOptions>()
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await?;

        MIGRATOR.run(&pool).await?;

        tracing::debug!("minion-queue backend ready");

        Ok(Self {
            pool,
            config,
            started_at: Utc::now(),
        })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub(crate) fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Acquire a connection and issue `BEGIN IMMEDIATE`, taking the write
    /// lock up front so multi-statement sequences (§5: the worker inbox
    /// read-modify-write) observe a consistent snapshot instead of racing
    /// another writer between statements.
    pub(crate) async fn begin_immediate(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }

    pub(crate) async fn commit(conn: &mut sqlx::pool::PoolConnection<Sqlite>) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut **conn).await?;
        Ok(())
    }

    pub(crate) async fn rollback(conn: &mut sqlx::pool::PoolConnection<Sqlite>) {
        if let Err(err) = sqlx::query("ROLLBACK").execute(&mut **conn).await {
            tracing::warn!(%err, "rollback failed");
        }
    }
}
