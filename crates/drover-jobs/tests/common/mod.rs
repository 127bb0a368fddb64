//! Common test infrastructure for job store integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use drover_config::DatabaseConfig;
use drover_jobs::{Database, JobQueue, NewJob, SqliteJobStore};
use tempfile::TempDir;

/// Test database wrapper.
///
/// Owns a temporary directory holding a real SQLite file; the file is
/// removed when the wrapper is dropped.
pub struct TestDatabase {
    _dir: TempDir,
    config: DatabaseConfig,
    db: Database,
}

impl TestDatabase {
    /// Creates and bootstraps a fresh database.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = DatabaseConfig {
            busy_timeout_ms: 10_000,
            ..DatabaseConfig::at(dir.path().join("drover.sqlite3"))
        };

        let db = Database::open(&config)
            .await
            .expect("Failed to open test database");

        Self {
            _dir: dir,
            config,
            db,
        }
    }

    /// The shared database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Configuration pointing at the test file.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Opens an independent pool on the same file, as another process would.
    pub async fn connect_another(&self) -> Database {
        Database::open(&self.config)
            .await
            .expect("Failed to open second connection pool")
    }

    /// Job store over the shared pool.
    pub fn store(&self) -> SqliteJobStore {
        self.db.job_store()
    }

    /// Operator facade over the shared pool.
    pub fn queue(&self) -> JobQueue {
        JobQueue::from_database(&self.db)
    }

    /// Moves a job's `run_after` so tests need not sleep through backoff.
    pub async fn set_run_after(&self, id: &str, at: DateTime<Utc>) {
        sqlx::query("UPDATE jobs SET run_after = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(id)
            .execute(self.db.pool())
            .await
            .expect("Failed to update run_after");
    }

    /// Overrides a job's `created_at`.
    pub async fn set_created_at(&self, id: &str, at: DateTime<Utc>) {
        sqlx::query("UPDATE jobs SET created_at = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(id)
            .execute(self.db.pool())
            .await
            .expect("Failed to update created_at");
    }
}

/// Builds a valid job.
pub fn new_job(id: &str, command: &str) -> NewJob {
    NewJob::new(id, command).expect("Invalid test job")
}
