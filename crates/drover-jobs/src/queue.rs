//! Operator-facing queue operations.
//!
//! Everything the command line does besides running workers goes through
//! [`JobQueue`].

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobState, NewJob};
use crate::metrics::JobMetrics;
use crate::settings::{Settings, KNOWN_KEYS};
use crate::sqlite::{Database, SqliteJobStore};
use crate::status::QueueStatus;
use crate::store::JobStore;
use crate::worker_registry::WorkerRegistry;
use chrono::Utc;
use tracing::info;

/// Job queue facade over a store, its settings and the worker registry.
pub struct JobQueue<S: JobStore = SqliteJobStore> {
    store: S,
    settings: Settings,
    workers: WorkerRegistry,
}

impl JobQueue<SqliteJobStore> {
    /// Queue over a bootstrapped database.
    #[must_use]
    pub fn from_database(db: &Database) -> Self {
        Self::new(db.job_store(), db.settings(), db.workers())
    }
}

impl<S: JobStore> JobQueue<S> {
    /// Creates a queue from its parts.
    pub fn new(store: S, settings: Settings, workers: WorkerRegistry) -> Self {
        Self {
            store,
            settings,
            workers,
        }
    }

    /// Adds a job, replacing any existing job with the same id.
    pub async fn enqueue(&self, job: NewJob) -> JobResult<JobId> {
        self.store.enqueue(&job, Utc::now()).await?;
        JobMetrics::job_enqueued();
        info!(job_id = %job.id, command = %job.command, "Job enqueued");
        Ok(job.id)
    }

    /// Job counts per state and the number of registered workers.
    pub async fn status(&self) -> JobResult<QueueStatus> {
        Ok(QueueStatus {
            jobs: self.store.count_by_state().await?,
            active_workers: self.workers.count().await?,
        })
    }

    /// Lists jobs, optionally only those in `state`.
    pub async fn list(&self, state: Option<JobState>) -> JobResult<Vec<Job>> {
        self.store.list(state).await
    }

    /// Fetches a job, failing with `NotFound` if it does not exist.
    pub async fn get(&self, id: &JobId) -> JobResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Lists dead-lettered jobs.
    pub async fn dlq_list(&self) -> JobResult<Vec<Job>> {
        self.store.list(Some(JobState::Dead)).await
    }

    /// Moves a dead job back to `pending` with a fresh retry budget.
    ///
    /// Only dead jobs are accepted; anything else is left untouched.
    pub async fn dlq_retry(&self, id: &JobId) -> JobResult<Job> {
        let job = self.get(id).await?;

        if job.state != JobState::Dead {
            return Err(JobError::InvalidState {
                expected: JobState::Dead.to_string(),
                actual: job.state.to_string(),
            });
        }

        let requeued = NewJob::new(job.id.as_str(), job.command)?;
        self.store.enqueue(&requeued, Utc::now()).await?;
        JobMetrics::job_enqueued();
        info!(job_id = %id, previous_attempts = job.attempts, "Dead job requeued");

        self.get(id).await
    }

    /// Updates a runtime setting.
    pub async fn config_set(&self, key: &str, value: &str) -> JobResult<()> {
        self.settings.set(key, value).await
    }

    /// Reads a runtime setting.
    pub async fn config_get(&self, key: &str) -> JobResult<Option<String>> {
        if !KNOWN_KEYS.contains(&key) {
            return Err(JobError::UnknownSetting(key.to_string()));
        }
        self.settings.get(key).await
    }

    /// All runtime settings.
    pub async fn config_list(&self) -> JobResult<Vec<(String, String)>> {
        self.settings.all().await
    }
}
