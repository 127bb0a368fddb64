//! Job queue metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "drover_jobs_enqueued_total";
    /// Total jobs claimed by a worker.
    pub const JOBS_CLAIMED_TOTAL: &str = "drover_jobs_claimed_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "drover_jobs_completed_total";
    /// Total failed executions that were rescheduled.
    pub const JOBS_RETRIED_TOTAL: &str = "drover_jobs_retried_total";
    /// Total jobs dead-lettered.
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "drover_jobs_dead_lettered_total";

    /// Job command duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "drover_job_duration_seconds";

    /// Worker loops running in this process.
    pub const WORKERS_ACTIVE: &str = "drover_workers_active";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_CLAIMED_TOTAL,
        "Total number of jobs claimed by a worker"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_RETRIED_TOTAL,
        "Total number of failed executions rescheduled with backoff"
    );
    describe_counter!(
        names::JOBS_DEAD_LETTERED_TOTAL,
        "Total number of jobs moved to the dead letter queue"
    );
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job command duration in seconds"
    );
    describe_gauge!(names::WORKERS_ACTIVE, "Number of running worker loops");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued() {
        counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
    }

    /// Record a job claimed.
    pub fn job_claimed() {
        counter!(names::JOBS_CLAIMED_TOTAL).increment(1);
    }

    /// Record a job completed.
    pub fn job_completed(duration: Duration) {
        counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
        histogram!(names::JOB_DURATION_SECONDS, "status" => "completed")
            .record(duration.as_secs_f64());
    }

    /// Record a failed execution that will be retried.
    pub fn job_retried(attempt: u32, duration: Duration) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "attempt" => attempt.to_string()
        )
        .increment(1);
        histogram!(names::JOB_DURATION_SECONDS, "status" => "failed")
            .record(duration.as_secs_f64());
    }

    /// Record a job sent to the dead letter queue.
    pub fn job_dead_lettered(duration: Duration) {
        counter!(names::JOBS_DEAD_LETTERED_TOTAL).increment(1);
        histogram!(names::JOB_DURATION_SECONDS, "status" => "dead")
            .record(duration.as_secs_f64());
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// A worker loop started.
    pub fn worker_started() {
        gauge!(names::WORKERS_ACTIVE).increment(1.0);
    }

    /// A worker loop stopped.
    pub fn worker_stopped() {
        gauge!(names::WORKERS_ACTIVE).decrement(1.0);
    }
}
