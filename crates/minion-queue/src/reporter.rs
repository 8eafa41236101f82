use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::instrument;

use crate::backend::Backend;
use crate::codec;
use crate::error::Result;
use crate::model::{
    History, HistoryBucket, Job, JobState, ListJobsFilter, ListLocksFilter, ListWorkersFilter,
    Lock, Page, Stats, Worker,
};

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job> {
    let args_text: String = row.try_get("args")?;
    let parents_text: String = row.try_get("parents")?;
    let notes_text: String = row.try_get("notes")?;
    let result_text: Option<String> = row.try_get("result")?;
    let state: String = row.try_get("state")?;

    Ok(Job {
        id: row.try_get("id")?,
        task: row.try_get("task")?,
        args: codec::decode(&args_text)?,
        queue: row.try_get("queue")?,
        priority: row.try_get("priority")?,
        state: JobState::from_sql(&state),
        attempts: row.try_get("attempts")?,
        retries: row.try_get("retries")?,
        delayed: row.try_get("delayed")?,
        expires: row.try_get("expires")?,
        lax: row.try_get("lax")?,
        parents: codec::decode_ids(&parents_text)?,
        notes: match codec::decode(&notes_text)? {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        result: result_text.map(|text| codec::decode(&text)).transpose()?,
        worker: row.try_get("worker")?,
        created: row.try_get("created")?,
        started: row.try_get("started")?,
        retried: row.try_get("retried")?,
        finished: row.try_get("finished")?,
    })
}

fn row_to_worker(row: sqlx::sqlite::SqliteRow) -> Result<Worker> {
    let status_text: String = row.try_get("status")?;
    let inbox_text: String = row.try_get("inbox")?;

    Ok(Worker {
        id: row.try_get("id")?,
        host: row.try_get("host")?,
        pid: row.try_get("pid")?,
        started: row.try_get("started")?,
        notified: row.try_get("notified")?,
        status: match codec::decode(&status_text)? {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        inbox: codec::decode_inbox(&inbox_text)?,
    })
}

fn row_to_lock(row: sqlx::sqlite::SqliteRow) -> Result<Lock> {
    Ok(Lock {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        expires: row.try_get("expires")?,
    })
}

fn push_job_filter(builder: &mut QueryBuilder<Sqlite>, filter: &ListJobsFilter) {
    if let Some(before) = filter.before {
        builder.push(" AND id < ");
        builder.push_bind(before);
    }
    if let Some(ids) = &filter.ids {
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(")");
    }
    if let Some(queues) = &filter.queues {
        builder.push(" AND queue IN (");
        let mut separated = builder.separated(", ");
        for queue in queues {
            separated.push_bind(queue.clone());
        }
        builder.push(")");
    }
    if let Some(states) = &filter.states {
        builder.push(" AND state IN (");
        let mut separated = builder.separated(", ");
        for state in states {
            separated.push_bind(state.as_sql());
        }
        builder.push(")");
    }
    if let Some(tasks) = &filter.tasks {
        builder.push(" AND task IN (");
        let mut separated = builder.separated(", ");
        for task in tasks {
            separated.push_bind(task.clone());
        }
        builder.push(")");
    }
}

impl Backend {
    /// Aggregated counters (§4.8, §6.2). `inactive_workers` is derived as
    /// `total_workers - active_workers` in application code so I7 holds by
    /// construction rather than by two queries agreeing.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<Stats> {
        let now = Utc::now();

        let job_counts = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE state = 'active') AS active_jobs,
                COUNT(*) FILTER (WHERE state = 'inactive') AS inactive_jobs,
                COUNT(*) FILTER (WHERE state = 'failed') AS failed_jobs,
                COUNT(*) FILTER (WHERE state = 'finished') AS finished_jobs,
                COUNT(*) FILTER (WHERE state = 'inactive' AND delayed > ?) AS delayed_jobs
            FROM minion_jobs
            "#,
        )
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        let total_workers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM minion_workers")
            .fetch_one(self.pool())
            .await?;

        let active_workers: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM minion_workers w
            WHERE EXISTS (
                SELECT 1 FROM minion_jobs j WHERE j.worker = w.id AND j.state = 'active'
            )
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        let active_locks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM minion_locks WHERE expires > ?")
                .bind(now)
                .fetch_one(self.pool())
                .await?;

        let enqueued_jobs: i64 = sqlx::query_scalar(
            "SELECT COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'minion_jobs'), 0)",
        )
        .fetch_one(self.pool())
        .await?;

        Ok(Stats {
            active_jobs: job_counts.try_get("active_jobs")?,
            inactive_jobs: job_counts.try_get("inactive_jobs")?,
            active_workers,
            inactive_workers: total_workers - active_workers,
            failed_jobs: job_counts.try_get("failed_jobs")?,
            finished_jobs: job_counts.try_get("finished_jobs")?,
            delayed_jobs: job_counts.try_get("delayed_jobs")?,
            active_locks,
            enqueued_jobs,
            uptime: (now - self.started_at()).num_seconds(),
        })
    }

    /// 24 hourly buckets covering the trailing day, oldest first; every
    /// hour is represented even if empty (§4.8, P6).
    #[instrument(skip(self))]
    pub async fn history(&self) -> Result<History> {
        let now = Utc::now();
        let current_hour = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .expect("zeroing minute/second/nanosecond never fails");
        let window_start = current_hour - ChronoDuration::hours(23);

        let rows = sqlx::query(
            r#"
            SELECT
                strftime('%Y-%m-%dT%H:00:00Z', finished) AS hour,
                state,
                COUNT(*) AS cnt
            FROM minion_jobs
            WHERE finished >= ? AND state IN ('finished', 'failed')
            GROUP BY hour, state
            "#,
        )
        .bind(window_start)
        .fetch_all(self.pool())
        .await?;

        let mut finished_by_hour: HashMap<String, i64> = HashMap::new();
        let mut failed_by_hour: HashMap<String, i64> = HashMap::new();
        for row in rows {
            let hour: String = row.try_get("hour")?;
            let state: String = row.try_get("state")?;
            let cnt: i64 = row.try_get("cnt")?;
            match state.as_str() {
                "finished" => {
                    finished_by_hour.insert(hour, cnt);
                }
                "failed" => {
                    failed_by_hour.insert(hour, cnt);
                }
                _ => {}
            }
        }

        let mut daily = Vec::with_capacity(24);
        for i in 0..24 {
            let bucket_time = window_start + ChronoDuration::hours(i);
            let key = bucket_time.format("%Y-%m-%dT%H:00:00Z").to_string();
            daily.push(HistoryBucket {
                epoch: bucket_time.timestamp(),
                finished_jobs: finished_by_hour.get(&key).copied().unwrap_or(0),
                failed_jobs: failed_by_hour.get(&key).copied().unwrap_or(0),
            });
        }

        Ok(History { daily })
    }

    /// Page through jobs, newest first, matching `filter` (§4.8, §6.2).
    #[instrument(skip(self, filter))]
    pub async fn list_jobs(
        &self,
        offset: i64,
        limit: i64,
        filter: ListJobsFilter,
    ) -> Result<Page<Job>> {
        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM minion_jobs WHERE 1 = 1");
        push_job_filter(&mut count_builder, &filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(self.pool())
            .await?;

        let mut select_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM minion_jobs WHERE 1 = 1");
        push_job_filter(&mut select_builder, &filter);
        select_builder.push(" ORDER BY id DESC LIMIT ");
        select_builder.push_bind(limit);
        select_builder.push(" OFFSET ");
        select_builder.push_bind(offset);

        let rows = select_builder.build().fetch_all(self.pool()).await?;
        let jobs = rows.into_iter().map(row_to_job).collect::<Result<_>>()?;

        Ok(Page { rows: jobs, total })
    }

    /// Page through workers, newest first, matching `filter` (§4.8, §6.2).
    #[instrument(skip(self, filter))]
    pub async fn list_workers(
        &self,
        offset: i64,
        limit: i64,
        filter: ListWorkersFilter,
    ) -> Result<Page<Worker>> {
        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM minion_workers WHERE 1 = 1");
        push_worker_filter(&mut count_builder, &filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(self.pool())
            .await?;

        let mut select_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM minion_workers WHERE 1 = 1");
        push_worker_filter(&mut select_builder, &filter);
        select_builder.push(" ORDER BY id DESC LIMIT ");
        select_builder.push_bind(limit);
        select_builder.push(" OFFSET ");
        select_builder.push_bind(offset);

        let rows = select_builder.build().fetch_all(self.pool()).await?;
        let workers = rows.into_iter().map(row_to_worker).collect::<Result<_>>()?;

        Ok(Page {
            rows: workers,
            total,
        })
    }

    /// Page through locks, newest first, matching `filter` (§4.8, §6.2).
    #[instrument(skip(self, filter))]
    pub async fn list_locks(
        &self,
        offset: i64,
        limit: i64,
        filter: ListLocksFilter,
    ) -> Result<Page<Lock>> {
        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM minion_locks WHERE 1 = 1");
        push_lock_filter(&mut count_builder, &filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(self.pool())
            .await?;

        let mut select_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM minion_locks WHERE 1 = 1");
        push_lock_filter(&mut select_builder, &filter);
        select_builder.push(" ORDER BY id DESC LIMIT ");
        select_builder.push_bind(limit);
        select_builder.push(" OFFSET ");
        select_builder.push_bind(offset);

        let rows = select_builder.build().fetch_all(self.pool()).await?;
        let locks = rows.into_iter().map(row_to_lock).collect::<Result<_>>()?;

        Ok(Page { rows: locks, total })
    }

    /// Merge-update a job's notes: a value of `null` removes the key,
    /// anything else sets it (§6.2, P8). Rejects keys containing `.`,
    /// `[`, or `]` before touching storage.
    #[instrument(skip(self, updates))]
    pub async fn note(&self, id: i64, updates: Map<String, Value>) -> Result<bool> {
        for key in updates.keys() {
            codec::validate_note_key(key)?;
        }

        let mut conn = self.begin_immediate().await?;

        let result: Result<bool> = async {
            let row = sqlx::query("SELECT notes FROM minion_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

            let Some(row) = row else {
                return Ok(false);
            };

            let notes_text: String = row.try_get("notes")?;
            let mut notes = match codec::decode(&notes_text)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            codec::merge_notes(&mut notes, &updates);
            let new_text = codec::encode(&Value::Object(notes))?;

            let rows_affected = sqlx::query("UPDATE minion_jobs SET notes = ? WHERE id = ?")
                .bind(new_text)
                .bind(id)
                .execute(&mut *conn)
                .await?
                .rows_affected();

            Ok(rows_affected == 1)
        }
        .await;

        match result {
            Ok(updated) => {
                Backend::commit(&mut conn).await?;
                Ok(updated)
            }
            Err(err) => {
                Backend::rollback(&mut conn).await;
                Err(err)
            }
        }
    }
}

fn push_worker_filter(builder: &mut QueryBuilder<Sqlite>, filter: &ListWorkersFilter) {
    if let Some(before) = filter.before {
        builder.push(" AND id < ");
        builder.push_bind(before);
    }
    if let Some(ids) = &filter.ids {
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(")");
    }
}

fn push_lock_filter(builder: &mut QueryBuilder<Sqlite>, filter: &ListLocksFilter) {
    if let Some(names) = &filter.names {
        builder.push(" AND name IN (");
        let mut separated = builder.separated(", ");
        for name in names {
            separated.push_bind(name.clone());
        }
        builder.push(")");
    }
}
