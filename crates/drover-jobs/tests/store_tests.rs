//! Integration tests for SqliteJobStore.
//!
//! Each test runs against its own SQLite file in a temporary directory.

mod common;

use chrono::{DateTime, Duration, Utc};
use common::{new_job, TestDatabase};
use drover_config::DatabaseConfig;
use drover_jobs::{Database, JobError, JobId, JobState, JobStore};
use std::collections::HashSet;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

#[tokio::test]
async fn test_enqueue_and_get() {
    let db = TestDatabase::new().await;
    let store = db.store();

    store.enqueue(&new_job("job1", "echo hi"), at(0)).await.unwrap();

    let job = store.get(&JobId::from("job1")).await.unwrap().unwrap();
    assert_eq!(job.command, "echo hi");
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.last_error, None);
    assert_eq!(job.run_after, at(0));
    assert_eq!(job.created_at, at(0));
}

#[tokio::test]
async fn test_get_unknown_job() {
    let db = TestDatabase::new().await;
    assert!(db.store().get(&JobId::from("nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_marks_processing() {
    let db = TestDatabase::new().await;
    let store = db.store();
    store.enqueue(&new_job("job1", "true"), at(0)).await.unwrap();

    let claimed = store.claim_next(at(1)).await.unwrap().unwrap();
    assert_eq!(claimed.id.as_str(), "job1");
    assert_eq!(claimed.attempts, 0);

    let job = store.get(&claimed.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Processing);
    assert_eq!(job.updated_at, at(1));

    assert!(store.claim_next(at(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_on_empty_store() {
    let db = TestDatabase::new().await;
    assert!(db.store().claim_next(Utc::now()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_is_fifo_by_creation() {
    let db = TestDatabase::new().await;
    let store = db.store();

    store.enqueue(&new_job("c", "true"), at(3)).await.unwrap();
    store.enqueue(&new_job("a", "true"), at(1)).await.unwrap();
    store.enqueue(&new_job("b", "true"), at(2)).await.unwrap();

    let mut order = Vec::new();
    while let Some(job) = store.claim_next(at(10)).await.unwrap() {
        order.push(job.id.to_string());
    }
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_creation_ties_are_broken_by_id() {
    let db = TestDatabase::new().await;
    let store = db.store();

    for id in ["job-b", "job-c", "job-a"] {
        store.enqueue(&new_job(id, "true"), at(0)).await.unwrap();
    }

    let first = store.claim_next(at(1)).await.unwrap().unwrap();
    let second = store.claim_next(at(1)).await.unwrap().unwrap();
    assert_eq!(first.id.as_str(), "job-a");
    assert_eq!(second.id.as_str(), "job-b");
}

#[tokio::test]
async fn test_failed_job_waits_for_backoff() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let id = JobId::from("flaky");

    store.enqueue(&new_job("flaky", "false"), at(0)).await.unwrap();
    store.claim_next(at(0)).await.unwrap().unwrap();
    store
        .fail_retry(&id, "exit 1", 1, at(2), at(0))
        .await
        .unwrap();

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("exit 1"));

    assert!(store.claim_next(at(1)).await.unwrap().is_none());

    let claimed = store.claim_next(at(2)).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.attempts, 1);
}

#[tokio::test]
async fn test_dead_and_completed_jobs_are_not_claimable() {
    let db = TestDatabase::new().await;
    let store = db.store();

    store.enqueue(&new_job("dead", "false"), at(0)).await.unwrap();
    store.enqueue(&new_job("done", "true"), at(1)).await.unwrap();
    store
        .mark_dead(&JobId::from("dead"), "exit 1", 3, at(2))
        .await
        .unwrap();
    store.complete(&JobId::from("done"), at(2)).await.unwrap();

    assert!(store.claim_next(at(100)).await.unwrap().is_none());

    let dead = store.get(&JobId::from("dead")).await.unwrap().unwrap();
    assert_eq!(dead.state, JobState::Dead);
    assert_eq!(dead.attempts, 3);
}

#[tokio::test]
async fn test_complete_is_idempotent() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let id = JobId::from("job1");

    store.enqueue(&new_job("job1", "true"), at(0)).await.unwrap();
    store.claim_next(at(0)).await.unwrap().unwrap();
    store.fail_retry(&id, "exit 1", 1, at(0), at(0)).await.unwrap();
    store.claim_next(at(0)).await.unwrap().unwrap();

    store.complete(&id, at(1)).await.unwrap();
    store.complete(&id, at(2)).await.unwrap();

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn test_transitions_on_unknown_job() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let id = JobId::from("ghost");

    assert!(matches!(
        store.complete(&id, at(0)).await,
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        store.fail_retry(&id, "exit 1", 1, at(1), at(0)).await,
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        store.mark_dead(&id, "exit 1", 3, at(0)).await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reenqueue_resets_the_record() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let id = JobId::from("job1");

    store.enqueue(&new_job("job1", "false"), at(0)).await.unwrap();
    store.claim_next(at(0)).await.unwrap().unwrap();
    store.mark_dead(&id, "exit 1", 3, at(1)).await.unwrap();

    store.enqueue(&new_job("job1", "echo again"), at(5)).await.unwrap();

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.command, "echo again");
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.last_error, None);
    assert_eq!(job.run_after, at(5));
    assert_eq!(job.created_at, at(5));
    assert_eq!(store.list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_and_count_by_state() {
    let db = TestDatabase::new().await;
    let store = db.store();

    for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
        let offset = i64::try_from(i).unwrap();
        store.enqueue(&new_job(id, "true"), at(offset)).await.unwrap();
    }
    store.claim_next(at(10)).await.unwrap().unwrap();
    store.complete(&JobId::from("a"), at(10)).await.unwrap();
    store.mark_dead(&JobId::from("d"), "exit 2", 3, at(10)).await.unwrap();

    let all = store.list(None).await.unwrap();
    let ids: Vec<_> = all.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);

    let pending = store.list(Some(JobState::Pending)).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|j| j.state == JobState::Pending));

    let counts = store.count_by_state().await.unwrap();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.dead, 1);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.total(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_share_a_job() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let now = Utc::now();

    let total = 40;
    for i in 0..total {
        store
            .enqueue(&new_job(&format!("job-{i:02}"), "true"), now)
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        // Independent pools behave like separate worker processes.
        let other = db.connect_another().await;
        handles.push(tokio::spawn(async move {
            let store = other.job_store();
            let mut claimed = Vec::new();
            while let Some(job) = store
                .claim_next(Utc::now() + Duration::seconds(1))
                .await
                .unwrap()
            {
                claimed.push(job.id.to_string());
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    let mut count = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            count += 1;
            assert!(seen.insert(id.clone()), "job {id} was claimed twice");
        }
    }

    assert_eq!(count, total);
    let counts = store.count_by_state().await.unwrap();
    assert_eq!(counts.processing, 40);
}

#[tokio::test]
async fn test_bootstrap_is_idempotent_and_keeps_settings() {
    let db = TestDatabase::new().await;
    db.db().settings().set("max_retries", "7").await.unwrap();
    db.store().enqueue(&new_job("keep", "true"), at(0)).await.unwrap();

    db.db().bootstrap().await.unwrap();
    let again = db.connect_another().await;

    assert_eq!(
        again.settings().get("max_retries").await.unwrap().as_deref(),
        Some("7")
    );
    assert!(again
        .job_store()
        .get(&JobId::from("keep"))
        .await
        .unwrap()
        .is_some());
    again.health_check().await.unwrap();
}

#[tokio::test]
async fn test_dropped_claim_releases_the_write_lock() {
    let db = TestDatabase::new().await;
    sqlx::query(
        r"
        WITH RECURSIVE seq(n) AS (SELECT 0 UNION ALL SELECT n + 1 FROM seq WHERE n < 1999)
        INSERT INTO jobs (id, command, state, attempts, run_after, created_at, updated_at)
        SELECT printf('job-%04d', n), 'true', 'pending', 0, 0, n, n FROM seq
        ",
    )
    .execute(db.db().pool())
    .await
    .unwrap();

    let single = Database::open(&DatabaseConfig {
        max_connections: 1,
        ..db.config().clone()
    })
    .await
    .unwrap();
    let store = single.job_store();

    // Abandon a claim part-way through, as a timeout or aborted task would.
    {
        let mut claim = Box::pin(store.claim_next(Utc::now()));
        for _ in 0..2 {
            let _ = futures::poll!(claim.as_mut());
            tokio::task::yield_now().await;
        }
    }

    let other = db.connect_another().await;
    let claimed = other.job_store().claim_next(Utc::now()).await.unwrap().unwrap();

    // The same pool's only connection is usable again.
    let next = store.claim_next(Utc::now()).await.unwrap().unwrap();
    assert_ne!(claimed.id, next.id);
    assert!(store.count_by_state().await.unwrap().processing >= 2);
}
