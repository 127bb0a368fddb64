//! SQLite job store.

use crate::error::{JobError, JobResult};
use crate::job::{from_millis, to_millis, ClaimedJob, Job, JobId, JobState, NewJob};
use crate::status::StateCounts;
use crate::store::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteQueryResult};
use sqlx::FromRow;
use std::sync::LazyLock;
use tracing::debug;

const JOB_COLUMNS: &str =
    "id, command, state, attempts, last_error, run_after, created_at, updated_at";

/// Job store backed by a SQLite pool.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Creates a store over an existing pool. The schema must already exist.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Select-then-update, run while the connection holds the write lock.
    async fn claim_locked(
        conn: &mut SqliteConnection,
        now: i64,
    ) -> JobResult<Option<ClaimedJob>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(CLAIM_SELECT.as_str())
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

        let Some((id, command, attempts)) = row else {
            return Ok(None);
        };

        sqlx::query("UPDATE jobs SET state = 'processing', updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(&id)
            .execute(&mut *conn)
            .await?;

        Ok(Some(ClaimedJob {
            id: JobId::from(id),
            command,
            attempts: attempts_from_db(attempts),
        }))
    }
}

/// Oldest claimable job; the state filter follows [`JobState::is_claimable`].
static CLAIM_SELECT: LazyLock<String> = LazyLock::new(|| {
    let states = JobState::ALL
        .into_iter()
        .filter(|state| state.is_claimable())
        .map(|state| format!("'{}'", state.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT id, command, attempts FROM jobs \
         WHERE state IN ({states}) AND run_after <= ? \
         ORDER BY created_at ASC, id ASC \
         LIMIT 1"
    )
});

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    last_error: Option<String>,
    run_after: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = JobError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::from(row.id),
            command: row.command,
            state: row.state.parse()?,
            attempts: attempts_from_db(row.attempts),
            last_error: row.last_error,
            run_after: from_millis(row.run_after),
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        })
    }
}

fn attempts_from_db(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn ensure_found(result: &SqliteQueryResult, id: &JobId) -> JobResult<()> {
    if result.rows_affected() == 0 {
        return Err(JobError::NotFound(id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: &NewJob, now: DateTime<Utc>) -> JobResult<()> {
        let now = to_millis(now);

        sqlx::query(
            r"
            INSERT OR REPLACE INTO jobs
                (id, command, state, attempts, last_error, run_after, created_at, updated_at)
            VALUES (?, ?, 'pending', 0, NULL, ?, ?, ?)
            ",
        )
        .bind(job.id.as_str())
        .bind(&job.command)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %job.id, "Job stored");
        Ok(())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> JobResult<Option<ClaimedJob>> {
        // Take the reserved lock up front so no other writer can interleave
        // between the select and the update. An uncommitted transaction rolls
        // back when dropped.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let claimed = Self::claim_locked(&mut *tx, to_millis(now)).await?;
        if claimed.is_some() {
            tx.commit().await?;
        }

        Ok(claimed)
    }

    async fn complete(&self, id: &JobId, now: DateTime<Utc>) -> JobResult<()> {
        let result = sqlx::query("UPDATE jobs SET state = 'completed', updated_at = ? WHERE id = ?")
            .bind(to_millis(now))
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        ensure_found(&result, id)
    }

    async fn fail_retry(
        &self,
        id: &JobId,
        error: &str,
        attempts: u32,
        run_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> JobResult<()> {
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'failed', last_error = ?, attempts = ?, run_after = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(error)
        .bind(i64::from(attempts))
        .bind(to_millis(run_after))
        .bind(to_millis(now))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        ensure_found(&result, id)
    }

    async fn mark_dead(
        &self,
        id: &JobId,
        error: &str,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> JobResult<()> {
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET state = 'dead', last_error = ?, attempts = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(error)
        .bind(i64::from(attempts))
        .bind(to_millis(now))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        ensure_found(&result, id)
    }

    async fn get(&self, id: &JobId) -> JobResult<Option<Job>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list(&self, state: Option<JobState>) -> JobResult<Vec<Job>> {
        let rows: Vec<JobRow> = match state {
            Some(state) => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE state = ? ORDER BY created_at ASC, id ASC"
                ))
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at ASC, id ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_by_state(&self) -> JobResult<StateCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StateCounts::default();
        for (state, count) in rows {
            counts.add(state.parse()?, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }
}
