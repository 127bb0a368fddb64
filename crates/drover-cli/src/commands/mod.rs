pub mod config;
pub mod dlq;
pub mod enqueue;
pub mod jobs;
pub mod worker;

use crate::output::OutputFormat;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use drover_config::AppConfig;
use drover_jobs::{Database, JobQueue, JobResult};
use std::path::PathBuf;

/// Shared state for every subcommand.
pub struct Context {
    pub config: AppConfig,
    pub config_dir: PathBuf,
    pub output: OutputFormat,
}

impl Context {
    /// Opens the job database, creating and bootstrapping it if needed.
    pub async fn open_database(&self) -> Result<Database> {
        Ok(Database::open(&self.config.database).await?)
    }

    /// Runs `f` against a queue over a freshly opened database, closing it afterwards.
    pub async fn with_queue<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(JobQueue) -> Fut,
        Fut: std::future::Future<Output = JobResult<T>>,
    {
        let db = self.open_database().await?;
        let result = f(JobQueue::from_database(&db)).await;
        db.close().await;
        Ok(result?)
    }
}

pub(crate) fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
