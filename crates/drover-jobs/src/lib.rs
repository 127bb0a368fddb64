//! Drover Jobs - Local Persistent Job Queue
//!
//! Shell commands are enqueued into a SQLite database and executed by a
//! pool of worker processes:
//! - Atomic claim across processes (`BEGIN IMMEDIATE`)
//! - Exponential backoff retries with a configurable budget
//! - Dead letter queue for jobs that keep failing
//! - Runtime settings shared through the database
//! - Cooperative shutdown: running jobs always finish
//!
//! # Architecture
//!
//! ```text
//!   drover enqueue ──► ┌──────────────────────────────┐
//!                      │      SQLite (WAL) file        │
//!                      │  jobs · config · workers      │
//!                      └──────┬─────────┬─────────┬────┘
//!                  claim_next │         │         │
//!                      ┌──────▼──┐ ┌────▼────┐ ┌──▼──────┐
//!                      │ worker 1│ │ worker 2│ │ worker N│  (OS processes)
//!                      └──────▲──┘ └────▲────┘ └──▲──────┘
//!                             └─────────┴─────────┘
//!                                  Supervisor
//! ```
//!
//! Job lifecycle:
//!
//! ```text
//! pending ──► processing ──► completed
//!    ▲            │
//!    │            ├──► failed ──(run_after elapsed)──► processing
//!    │            └──► dead
//!    └──── dlq retry / re-enqueue
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use drover_jobs::prelude::*;
//!
//! let db = Database::open(&config.database).await?;
//! let queue = JobQueue::from_database(&db);
//! let job = NewJob::from_json(r#"{"id": "backup", "command": "tar czf /tmp/b.tgz /srv"}"#)?;
//! queue.enqueue(job).await?;
//!
//! let mut worker = WorkerLoop::new(
//!     db.job_store(),
//!     ShellRunner::default(),
//!     db.settings(),
//!     db.workers(),
//!     WorkerLoopConfig::default(),
//! );
//! worker.run(cancel).await?;
//! ```

pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod settings;
pub mod sqlite;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod worker;
pub mod worker_registry;

pub use error::{JobError, JobResult};
pub use job::{ClaimedJob, Job, JobId, JobState, NewJob};
pub use self::metrics::{register_metrics, JobMetrics, WorkerMetrics};
pub use queue::JobQueue;
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{CommandOutcome, CommandRunner, ShellRunner};
pub use settings::Settings;
pub use sqlite::{Database, SqliteJobStore};
pub use status::{QueueStatus, StateCounts};
pub use store::JobStore;
pub use supervisor::{PoolReport, ProcessLauncher, Supervisor, WorkerExit};
pub use worker::{Settlement, WorkerLoop, WorkerLoopConfig, WorkerPhase, WorkerSummary};
pub use worker_registry::{WorkerInfo, WorkerRegistry};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::queue::JobQueue;
    pub use crate::runner::{CommandRunner, ShellRunner};
    pub use crate::sqlite::Database;
    pub use crate::store::JobStore;
    pub use crate::worker::{WorkerLoop, WorkerLoopConfig};
    pub use crate::{JobError, JobId, JobResult, JobState, NewJob};
}
