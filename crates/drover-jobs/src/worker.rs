//! Worker loop: claim a job, run it, record the outcome, repeat.
//!
//! One loop runs per worker process. A job that has started always runs to
//! completion; cancellation is observed only before the next poll.

use crate::error::{JobError, JobResult};
use crate::job::ClaimedJob;
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::retry::RetryDecision;
use crate::runner::{CommandOutcome, CommandRunner};
use crate::settings::Settings;
use crate::store::JobStore;
use crate::worker_registry::WorkerRegistry;
use chrono::{DateTime, Utc};
use drover_config::WorkerConfig;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerLoopConfig {
    /// Pause between polls when nothing is claimable.
    pub poll_interval: Duration,

    /// Id under which the worker registers. Defaults to the process id.
    pub pid: u32,
}

impl Default for WorkerLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            pid: std::process::id(),
        }
    }
}

impl From<&WorkerConfig> for WorkerLoopConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            ..Self::default()
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Polling,
    Executing,
    Settling,
    Stopped,
}

/// How a claimed job was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Exit status 0.
    Completed,
    /// Failed and rescheduled.
    Retrying {
        attempts: u32,
        run_after: DateTime<Utc>,
    },
    /// Failed with the retry budget exhausted.
    Dead { attempts: u32 },
    /// The job row vanished before its outcome could be recorded.
    Missing,
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub processed: u64,
    pub completed: u64,
    pub retried: u64,
    pub dead: u64,
}

impl WorkerSummary {
    fn record(&mut self, settlement: Settlement) {
        self.processed += 1;
        match settlement {
            Settlement::Completed => self.completed += 1,
            Settlement::Retrying { .. } => self.retried += 1,
            Settlement::Dead { .. } => self.dead += 1,
            Settlement::Missing => {}
        }
    }
}

/// A single worker.
pub struct WorkerLoop<S: JobStore, R: CommandRunner> {
    store: S,
    runner: R,
    settings: Settings,
    registry: WorkerRegistry,
    config: WorkerLoopConfig,
    phase: WorkerPhase,
    summary: WorkerSummary,
}

impl<S: JobStore, R: CommandRunner> WorkerLoop<S, R> {
    /// Creates a worker loop.
    pub fn new(
        store: S,
        runner: R,
        settings: Settings,
        registry: WorkerRegistry,
        config: WorkerLoopConfig,
    ) -> Self {
        Self {
            store,
            runner,
            settings,
            registry,
            config,
            phase: WorkerPhase::Idle,
            summary: WorkerSummary::default(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Counters so far.
    pub fn summary(&self) -> WorkerSummary {
        self.summary
    }

    fn enter(&mut self, phase: WorkerPhase) {
        trace!(pid = self.config.pid, from = ?self.phase, to = ?phase, "Worker phase");
        self.phase = phase;
    }

    /// Runs until `cancel` fires or the store fails.
    ///
    /// The worker is registered for the duration of the call.
    pub async fn run(&mut self, cancel: CancellationToken) -> JobResult<WorkerSummary> {
        let pid = self.config.pid;

        self.registry.register(pid, Utc::now()).await?;
        WorkerMetrics::worker_started();
        info!(pid, poll_interval = ?self.config.poll_interval, "Worker started");

        let result = self.poll_loop(&cancel).await;

        self.enter(WorkerPhase::Stopped);
        WorkerMetrics::worker_stopped();

        match result {
            Ok(()) => {
                self.registry.deregister(pid).await?;
                info!(
                    pid,
                    processed = self.summary.processed,
                    completed = self.summary.completed,
                    retried = self.summary.retried,
                    dead = self.summary.dead,
                    "Worker stopped"
                );
                Ok(self.summary)
            }
            Err(e) => {
                error!(pid, error = %e, "Worker stopping on store error");
                if let Err(dereg) = self.registry.deregister(pid).await {
                    warn!(pid, error = %dereg, "Failed to deregister worker");
                }
                Err(e)
            }
        }
    }

    async fn poll_loop(&mut self, cancel: &CancellationToken) -> JobResult<()> {
        while !cancel.is_cancelled() {
            if self.tick().await?.is_none() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        Ok(())
    }

    /// One poll/execute/settle cycle.
    ///
    /// Returns `None` when nothing was claimable.
    pub async fn tick(&mut self) -> JobResult<Option<Settlement>> {
        self.enter(WorkerPhase::Polling);
        let Some(job) = self.store.claim_next(Utc::now()).await? else {
            self.enter(WorkerPhase::Idle);
            return Ok(None);
        };

        JobMetrics::job_claimed();
        info!(job_id = %job.id, attempts = job.attempts, command = %job.command, "Processing job");

        self.enter(WorkerPhase::Executing);
        let started = Instant::now();
        let outcome = self.runner.run(&job.command).await;
        let elapsed = started.elapsed();

        self.enter(WorkerPhase::Settling);
        let settlement = self.settle(&job, &outcome, elapsed).await?;

        self.summary.record(settlement);
        self.enter(WorkerPhase::Idle);
        Ok(Some(settlement))
    }

    async fn settle(
        &self,
        job: &ClaimedJob,
        outcome: &CommandOutcome,
        elapsed: Duration,
    ) -> JobResult<Settlement> {
        let now = Utc::now();

        let (settlement, result) = if outcome.is_success() {
            (Settlement::Completed, self.store.complete(&job.id, now).await)
        } else {
            let error = outcome.describe();
            let policy = self.settings.retry_policy().await?;

            match policy.evaluate(job.attempts, now) {
                RetryDecision::Retry {
                    attempts,
                    run_after,
                } => (
                    Settlement::Retrying {
                        attempts,
                        run_after,
                    },
                    self.store
                        .fail_retry(&job.id, &error, attempts, run_after, now)
                        .await,
                ),
                RetryDecision::Dead { attempts } => (
                    Settlement::Dead { attempts },
                    self.store.mark_dead(&job.id, &error, attempts, now).await,
                ),
            }
        };

        match result {
            Ok(()) => {}
            Err(JobError::NotFound(_)) => {
                warn!(job_id = %job.id, "Job disappeared before its outcome was recorded");
                return Ok(Settlement::Missing);
            }
            Err(e) => return Err(e),
        }

        match settlement {
            Settlement::Completed => {
                JobMetrics::job_completed(elapsed);
                info!(job_id = %job.id, elapsed = ?elapsed, "Job completed");
            }
            Settlement::Retrying {
                attempts,
                run_after,
            } => {
                JobMetrics::job_retried(attempts, elapsed);
                warn!(
                    job_id = %job.id,
                    attempts,
                    run_after = %run_after,
                    outcome = %outcome,
                    "Job failed, scheduled for retry"
                );
            }
            Settlement::Dead { attempts } => {
                JobMetrics::job_dead_lettered(elapsed);
                warn!(job_id = %job.id, attempts, outcome = %outcome, "Job moved to dead letter queue");
            }
            Settlement::Missing => debug!(job_id = %job.id, "Job settlement skipped"),
        }

        Ok(settlement)
    }
}
