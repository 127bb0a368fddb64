//! Integration tests for the worker loop.
//!
//! Commands are executed by scripted runners so outcomes are deterministic;
//! store failures are injected through a mock store.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{new_job, TestDatabase};
use drover_jobs::{
    ClaimedJob, CommandOutcome, CommandRunner, Job, JobError, JobId, JobResult, JobState,
    JobStore, NewJob, Settlement, StateCounts, WorkerLoop, WorkerLoopConfig, WorkerPhase,
};
use mockall::mock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const TEST_PID: u32 = 4242;

/// Returns queued outcomes in order, then `fallback` forever.
struct ScriptedRunner {
    outcomes: Mutex<VecDeque<CommandOutcome>>,
    fallback: CommandOutcome,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    fn always(outcome: CommandOutcome) -> Self {
        Self::script(Vec::new(), outcome)
    }

    fn script(outcomes: Vec<CommandOutcome>, fallback: CommandOutcome) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback,
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &str) -> CommandOutcome {
        self.commands.lock().push(command.to_string());
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Blocks each command until released.
struct GatedRunner {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl CommandRunner for GatedRunner {
    async fn run(&self, _command: &str) -> CommandOutcome {
        self.started.notify_one();
        self.release.notified().await;
        CommandOutcome::Exited(0)
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl JobStore for Store {
        async fn enqueue(&self, job: &NewJob, now: DateTime<Utc>) -> JobResult<()>;
        async fn claim_next(&self, now: DateTime<Utc>) -> JobResult<Option<ClaimedJob>>;
        async fn complete(&self, id: &JobId, now: DateTime<Utc>) -> JobResult<()>;
        async fn fail_retry(
            &self,
            id: &JobId,
            error: &str,
            attempts: u32,
            run_after: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> JobResult<()>;
        async fn mark_dead(
            &self,
            id: &JobId,
            error: &str,
            attempts: u32,
            now: DateTime<Utc>,
        ) -> JobResult<()>;
        async fn get(&self, id: &JobId) -> JobResult<Option<Job>>;
        async fn list(&self, state: Option<JobState>) -> JobResult<Vec<Job>>;
        async fn count_by_state(&self) -> JobResult<StateCounts>;
    }
}

fn worker<S: JobStore, R: CommandRunner>(db: &TestDatabase, store: S, runner: R) -> WorkerLoop<S, R> {
    WorkerLoop::new(
        store,
        runner,
        db.db().settings(),
        db.db().workers(),
        WorkerLoopConfig {
            poll_interval: Duration::from_millis(10),
            pid: TEST_PID,
        },
    )
}

async fn job(db: &TestDatabase, id: &str) -> Job {
    db.store().get(&JobId::from(id)).await.unwrap().unwrap()
}

/// Makes a rescheduled job claimable right away.
async fn expire_backoff(db: &TestDatabase, id: &str) {
    db.set_run_after(id, Utc::now() - chrono::Duration::seconds(1))
        .await;
}

#[tokio::test]
async fn test_tick_with_nothing_to_do() {
    let db = TestDatabase::new().await;
    let mut worker = worker(&db, db.store(), ScriptedRunner::always(CommandOutcome::Exited(0)));

    assert_eq!(worker.tick().await.unwrap(), None);
    assert_eq!(worker.phase(), WorkerPhase::Idle);
}

#[tokio::test]
async fn test_successful_job_completes() {
    let db = TestDatabase::new().await;
    let runner = ScriptedRunner::always(CommandOutcome::Exited(0));
    let commands = Arc::clone(&runner.commands);
    db.queue().enqueue(new_job("ok", "echo ok")).await.unwrap();

    let mut worker = worker(&db, db.store(), runner);
    assert_eq!(worker.tick().await.unwrap(), Some(Settlement::Completed));

    let job = job(&db, "ok").await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 0);
    assert_eq!(*commands.lock(), vec!["echo ok".to_string()]);
}

#[tokio::test]
async fn test_backoff_progression_until_dead() {
    let db = TestDatabase::new().await;
    db.queue().enqueue(new_job("flaky", "false")).await.unwrap();
    let mut worker = worker(&db, db.store(), ScriptedRunner::always(CommandOutcome::Exited(1)));

    // First failure: +2s
    let settlement = worker.tick().await.unwrap().unwrap();
    assert!(matches!(settlement, Settlement::Retrying { attempts: 1, .. }));
    let stored = job(&db, "flaky").await;
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.last_error.as_deref(), Some("exit 1"));
    assert_eq!(stored.run_after - stored.updated_at, chrono::Duration::seconds(2));

    // Not yet claimable.
    assert_eq!(worker.tick().await.unwrap(), None);

    // Second failure: +4s
    expire_backoff(&db, "flaky").await;
    let settlement = worker.tick().await.unwrap().unwrap();
    assert!(matches!(settlement, Settlement::Retrying { attempts: 2, .. }));
    let stored = job(&db, "flaky").await;
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.run_after - stored.updated_at, chrono::Duration::seconds(4));

    // Third failure reaches max_retries.
    expire_backoff(&db, "flaky").await;
    assert_eq!(
        worker.tick().await.unwrap(),
        Some(Settlement::Dead { attempts: 3 })
    );
    let stored = job(&db, "flaky").await;
    assert_eq!(stored.state, JobState::Dead);
    assert_eq!(stored.attempts, 3);

    expire_backoff(&db, "flaky").await;
    assert_eq!(worker.tick().await.unwrap(), None);
    assert_eq!(worker.summary().retried, 2);
    assert_eq!(worker.summary().dead, 1);
}

#[tokio::test]
async fn test_success_after_failure_keeps_attempts() {
    let db = TestDatabase::new().await;
    db.queue().enqueue(new_job("j", "maybe")).await.unwrap();
    let runner = ScriptedRunner::script(vec![CommandOutcome::Exited(2)], CommandOutcome::Exited(0));
    let mut worker = worker(&db, db.store(), runner);

    worker.tick().await.unwrap();
    expire_backoff(&db, "j").await;
    assert_eq!(worker.tick().await.unwrap(), Some(Settlement::Completed));

    let stored = job(&db, "j").await;
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.last_error.as_deref(), Some("exit 2"));
}

#[tokio::test]
async fn test_settings_apply_from_the_next_failure() {
    let db = TestDatabase::new().await;
    db.queue().enqueue(new_job("j", "false")).await.unwrap();
    let mut worker = worker(&db, db.store(), ScriptedRunner::always(CommandOutcome::Exited(1)));

    worker.tick().await.unwrap();

    db.db().settings().set("backoff_base", "10").await.unwrap();
    db.db().settings().set("max_retries", "5").await.unwrap();
    expire_backoff(&db, "j").await;

    let settlement = worker.tick().await.unwrap().unwrap();
    assert!(matches!(settlement, Settlement::Retrying { attempts: 2, .. }));
    let stored = job(&db, "j").await;
    assert_eq!(stored.run_after - stored.updated_at, chrono::Duration::seconds(100));
}

#[tokio::test]
async fn test_max_retries_of_one_dead_letters_immediately() {
    let db = TestDatabase::new().await;
    db.db().settings().set("max_retries", "1").await.unwrap();
    db.queue().enqueue(new_job("j", "false")).await.unwrap();
    let mut worker = worker(&db, db.store(), ScriptedRunner::always(CommandOutcome::Exited(9)));

    assert_eq!(
        worker.tick().await.unwrap(),
        Some(Settlement::Dead { attempts: 1 })
    );
    assert_eq!(job(&db, "j").await.last_error.as_deref(), Some("exit 9"));
}

#[tokio::test]
async fn test_spawn_failure_counts_as_failure() {
    let db = TestDatabase::new().await;
    db.queue().enqueue(new_job("j", "whatever")).await.unwrap();
    let runner = ScriptedRunner::always(CommandOutcome::FailedToStart("No such file".into()));
    let mut worker = worker(&db, db.store(), runner);

    let settlement = worker.tick().await.unwrap().unwrap();
    assert!(matches!(settlement, Settlement::Retrying { attempts: 1, .. }));
    let error = job(&db, "j").await.last_error.unwrap();
    assert!(error.starts_with("failed to start"));
}

#[tokio::test]
async fn test_run_stops_immediately_when_already_cancelled() {
    let db = TestDatabase::new().await;
    db.queue().enqueue(new_job("j", "true")).await.unwrap();
    let mut worker = worker(&db, db.store(), ScriptedRunner::always(CommandOutcome::Exited(0)));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = worker.run(cancel).await.unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(worker.phase(), WorkerPhase::Stopped);
    assert_eq!(job(&db, "j").await.state, JobState::Pending);
    assert_eq!(db.db().workers().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_drains_queue_and_deregisters() {
    let db = TestDatabase::new().await;
    let queue = db.queue();
    for id in ["a", "b", "c"] {
        queue.enqueue(new_job(id, "true")).await.unwrap();
    }

    let mut worker = worker(&db, db.store(), ScriptedRunner::always(CommandOutcome::Exited(0)));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if queue.status().await.unwrap().jobs.completed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("jobs were not processed in time");

    assert_eq!(queue.status().await.unwrap().active_workers, 1);

    cancel.cancel();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(queue.status().await.unwrap().active_workers, 0);
}

#[tokio::test]
async fn test_running_job_finishes_after_cancellation() {
    let db = TestDatabase::new().await;
    db.queue().enqueue(new_job("slow", "sleep 5")).await.unwrap();

    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let runner = GatedRunner {
        started: Arc::clone(&started),
        release: Arc::clone(&release),
    };
    let mut worker = worker(&db, db.store(), runner);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    started.notified().await;
    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    assert_eq!(job(&db, "slow").await.state, JobState::Processing);

    release.notify_one();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(job(&db, "slow").await.state, JobState::Completed);
}

#[tokio::test]
async fn test_store_failure_ends_run_and_deregisters() {
    let db = TestDatabase::new().await;
    let mut store = MockStore::new();
    store
        .expect_claim_next()
        .returning(|_| Err(JobError::Database(sqlx::Error::PoolClosed)));

    let mut worker = worker(&db, store, ScriptedRunner::always(CommandOutcome::Exited(0)));
    let err = worker.run(CancellationToken::new()).await.unwrap_err();

    assert!(err.is_store_failure());
    assert_eq!(worker.phase(), WorkerPhase::Stopped);
    assert_eq!(db.db().workers().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_vanished_job_is_skipped() {
    let db = TestDatabase::new().await;
    let mut store = MockStore::new();
    store.expect_claim_next().times(1).returning(|_| {
        Ok(Some(ClaimedJob {
            id: JobId::from("gone"),
            command: "true".to_string(),
            attempts: 0,
        }))
    });
    store
        .expect_complete()
        .times(1)
        .returning(|id, _| Err(JobError::NotFound(id.to_string())));

    let mut worker = worker(&db, store, ScriptedRunner::always(CommandOutcome::Exited(0)));

    assert_eq!(worker.tick().await.unwrap(), Some(Settlement::Missing));
    assert_eq!(worker.summary().processed, 1);
    assert_eq!(worker.summary().completed, 0);
}

#[tokio::test]
async fn test_failure_passes_previous_attempts_to_policy() {
    let db = TestDatabase::new().await;
    let mut store = MockStore::new();
    store.expect_claim_next().times(1).returning(|_| {
        Ok(Some(ClaimedJob {
            id: JobId::from("j"),
            command: "false".to_string(),
            attempts: 2,
        }))
    });
    store
        .expect_mark_dead()
        .withf(|id, error, attempts, _| id.as_str() == "j" && error == "exit 1" && *attempts == 3)
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let mut worker = worker(&db, store, ScriptedRunner::always(CommandOutcome::Exited(1)));
    assert_eq!(
        worker.tick().await.unwrap(),
        Some(Settlement::Dead { attempts: 3 })
    );
}
