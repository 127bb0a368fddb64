//! Runtime settings persisted alongside the jobs.
//!
//! Unlike [`drover_config::AppConfig`], these values are shared by every
//! process using the database and may be changed while workers run.

use crate::error::{JobError, JobResult};
use crate::retry::{RetryPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

/// Failing attempts allowed before a job is dead-lettered.
pub const MAX_RETRIES: &str = "max_retries";

/// Base of the exponential retry delay, in seconds.
pub const BACKOFF_BASE: &str = "backoff_base";

/// Keys accepted by [`Settings::set`].
pub const KNOWN_KEYS: [&str; 2] = [MAX_RETRIES, BACKOFF_BASE];

/// Key/value settings store.
#[derive(Clone)]
pub struct Settings {
    pool: SqlitePool,
}

impl Settings {
    /// Creates a settings handle over an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the raw value for `key`, if set.
    pub async fn get(&self, key: &str) -> JobResult<Option<String>> {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.map(|(v,)| v))
    }

    /// Reads `key` as an integer.
    ///
    /// Missing or non-numeric values yield `default`.
    pub async fn get_int(&self, key: &str, default: i64) -> JobResult<i64> {
        let Some(raw) = self.get(key).await? else {
            return Ok(default);
        };

        match raw.trim().parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                debug!(key, value = %raw, default, "Setting is not an integer, using default");
                Ok(default)
            }
        }
    }

    /// Stores `value` under `key`. Values are not validated.
    pub async fn set(&self, key: &str, value: &str) -> JobResult<()> {
        if !KNOWN_KEYS.contains(&key) {
            return Err(JobError::UnknownSetting(key.to_string()));
        }

        sqlx::query("INSERT OR REPLACE INTO config (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        info!(key, value, "Setting updated");
        Ok(())
    }

    /// All settings, ordered by key.
    pub async fn all(&self) -> JobResult<Vec<(String, String)>> {
        let rows = sqlx::query_as("SELECT key, value FROM config ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Reads the current retry policy.
    pub async fn retry_policy(&self) -> JobResult<RetryPolicy> {
        let max_retries = self
            .get_int(MAX_RETRIES, i64::from(DEFAULT_MAX_RETRIES))
            .await?;
        let backoff_base = self
            .get_int(BACKOFF_BASE, i64::from(DEFAULT_BACKOFF_BASE))
            .await?;

        Ok(RetryPolicy::from_settings(backoff_base, max_retries))
    }
}
