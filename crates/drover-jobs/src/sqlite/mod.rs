//! SQLite-backed persistence.
//!
//! A single database file is shared by every worker process. Each process
//! opens its own pool; cross-process coordination relies on SQLite locking
//! (`BEGIN IMMEDIATE` plus `busy_timeout`).

mod store;

pub use store::SqliteJobStore;

use crate::error::JobResult;
use crate::retry::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};
use crate::settings::{Settings, BACKOFF_BASE, MAX_RETRIES};
use crate::worker_registry::WorkerRegistry;
use drover_config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tracing::{debug, warn};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        command TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        run_after INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_jobs_state_run_after ON jobs(state, run_after)
    ",
    r"
    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS workers (
        pid INTEGER PRIMARY KEY,
        started_at INTEGER NOT NULL
    )
    ",
];

/// Handle to the job database.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database file described by `config`.
    ///
    /// The schema is not touched; call [`bootstrap`](Self::bootstrap) or use
    /// [`open`](Self::open).
    pub async fn connect(config: &DatabaseConfig) -> JobResult<Self> {
        debug!(path = %config.path.display(), "Opening job database");

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to open job database"))?;

        Ok(Self { pool })
    }

    /// Connects and bootstraps in one step.
    pub async fn open(config: &DatabaseConfig) -> JobResult<Self> {
        let db = Self::connect(config).await?;
        db.bootstrap().await?;
        Ok(db)
    }

    /// Creates tables and seeds default settings.
    ///
    /// Idempotent; several processes may run it concurrently.
    pub async fn bootstrap(&self) -> JobResult<()> {
        debug!("Bootstrapping job database schema");

        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        for (key, value) in [
            (MAX_RETRIES, DEFAULT_MAX_RETRIES),
            (BACKOFF_BASE, DEFAULT_BACKOFF_BASE),
        ] {
            sqlx::query("INSERT OR IGNORE INTO config (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value.to_string())
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Job store over this database.
    #[must_use]
    pub fn job_store(&self) -> SqliteJobStore {
        SqliteJobStore::new(self.pool.clone())
    }

    /// Runtime settings over this database.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings::new(self.pool.clone())
    }

    /// Worker registry over this database.
    #[must_use]
    pub fn workers(&self) -> WorkerRegistry {
        WorkerRegistry::new(self.pool.clone())
    }

    /// Returns a reference to the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checks that the database answers queries.
    pub async fn health_check(&self) -> JobResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Closes the pool.
    pub async fn close(&self) {
        debug!("Closing job database pool");
        self.pool.close().await;
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}
