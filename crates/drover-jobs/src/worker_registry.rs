//! Registry of running worker processes.
//!
//! Each worker loop registers its pid on start and removes it on stop, so
//! `drover status` can report how many are alive. A worker that is killed
//! leaves its row behind until a new process reuses the pid.

use crate::error::JobResult;
use crate::job::{from_millis, to_millis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

/// Information about a registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// OS process id.
    pub pid: u32,
    /// Registration timestamp.
    pub started_at: DateTime<Utc>,
}

/// Database-backed worker registry.
#[derive(Clone)]
pub struct WorkerRegistry {
    pool: SqlitePool,
}

impl WorkerRegistry {
    /// Creates a registry over an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers a worker, replacing any stale row for the same pid.
    pub async fn register(&self, pid: u32, now: DateTime<Utc>) -> JobResult<()> {
        sqlx::query("INSERT OR REPLACE INTO workers (pid, started_at) VALUES (?, ?)")
            .bind(i64::from(pid))
            .bind(to_millis(now))
            .execute(&self.pool)
            .await?;

        info!(pid, "Worker registered");
        Ok(())
    }

    /// Removes a worker.
    ///
    /// Returns true if the worker was registered.
    pub async fn deregister(&self, pid: u32) -> JobResult<bool> {
        let result = sqlx::query("DELETE FROM workers WHERE pid = ?")
            .bind(i64::from(pid))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!(pid, removed, "Worker deregistered");
        Ok(removed)
    }

    /// Lists registered workers, oldest first.
    pub async fn list(&self) -> JobResult<Vec<WorkerInfo>> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT pid, started_at FROM workers ORDER BY started_at ASC, pid ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(pid, started_at)| {
                u32::try_from(pid).ok().map(|pid| WorkerInfo {
                    pid,
                    started_at: from_millis(started_at),
                })
            })
            .collect())
    }

    /// Number of registered workers.
    pub async fn count(&self) -> JobResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workers")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}
