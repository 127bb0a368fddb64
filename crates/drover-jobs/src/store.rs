//! Job store abstraction.

use crate::error::JobResult;
use crate::job::{ClaimedJob, Job, JobId, JobState, NewJob};
use crate::status::StateCounts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable job storage shared by every worker process.
///
/// Transition methods are not guarded by the current state; they return
/// [`JobError::NotFound`](crate::JobError::NotFound) when the id is unknown.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts or fully replaces a job. Never fails on a duplicate id.
    async fn enqueue(&self, job: &NewJob, now: DateTime<Utc>) -> JobResult<()>;

    /// Atomically claims the oldest claimable job.
    ///
    /// No two concurrent callers, in any process, receive the same job.
    async fn claim_next(&self, now: DateTime<Utc>) -> JobResult<Option<ClaimedJob>>;

    /// Marks a job completed. Idempotent.
    async fn complete(&self, id: &JobId, now: DateTime<Utc>) -> JobResult<()>;

    /// Records a failed execution and reschedules the job.
    async fn fail_retry(
        &self,
        id: &JobId,
        error: &str,
        attempts: u32,
        run_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> JobResult<()>;

    /// Dead-letters a job.
    async fn mark_dead(
        &self,
        id: &JobId,
        error: &str,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> JobResult<()>;

    /// Fetches a job by id.
    async fn get(&self, id: &JobId) -> JobResult<Option<Job>>;

    /// Lists jobs in creation order, optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> JobResult<Vec<Job>>;

    /// Counts jobs per state.
    async fn count_by_state(&self) -> JobResult<StateCounts>;
}
