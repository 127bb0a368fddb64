//! Worker pool supervisor.
//!
//! Starts N worker processes and waits for all of them. Stopping is
//! cooperative: the supervisor closes each child's stdin and the child
//! finishes its current job before exiting. Children are never killed or
//! restarted.

use crate::error::{JobError, JobResult};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Arguments that start a single supervised worker loop.
pub const SUPERVISED_WORKER_ARGS: [&str; 3] = ["worker", "run", "--supervised"];

/// How worker processes are started.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    /// Launches `program` with `args`.
    pub fn new<I, A>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-executes the running binary as a supervised worker.
    ///
    /// `global_args` are passed before the subcommand so children share the
    /// parent's configuration.
    pub fn current_exe<I, A>(global_args: I) -> JobResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        let program = std::env::current_exe()?;
        let args = global_args
            .into_iter()
            .map(Into::into)
            .chain(SUPERVISED_WORKER_ARGS.iter().map(OsString::from));

        Ok(Self::new(program, args))
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn spawn(&self) -> JobResult<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| {
                JobError::Worker(format!(
                    "failed to start worker process {}: {e}",
                    self.program.display()
                ))
            })
    }
}

/// How one worker process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerExit {
    /// OS process id, if known.
    pub pid: Option<u32>,
    /// Exit status code; `None` if killed by a signal or not observable.
    pub exit_code: Option<i32>,
}

impl WorkerExit {
    /// True for exit status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Exit record for every worker the supervisor started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub workers: Vec<WorkerExit>,
}

impl PoolReport {
    /// Workers that exited abnormally.
    pub fn failed(&self) -> Vec<&WorkerExit> {
        self.workers.iter().filter(|w| !w.success()).collect()
    }

    /// True if every worker exited with status 0.
    pub fn all_succeeded(&self) -> bool {
        self.workers.iter().all(WorkerExit::success)
    }
}

/// Runs a fixed-size pool of worker processes.
#[derive(Debug, Clone)]
pub struct Supervisor {
    launcher: ProcessLauncher,
    count: usize,
}

impl Supervisor {
    /// Creates a supervisor for `count` workers.
    pub fn new(launcher: ProcessLauncher, count: usize) -> Self {
        Self { launcher, count }
    }

    /// Starts the pool and waits until every worker has exited.
    ///
    /// When `cancel` fires, each child's stdin is closed and the supervisor
    /// keeps waiting for the children to finish on their own.
    pub async fn run(&self, cancel: CancellationToken) -> JobResult<PoolReport> {
        let mut stdins: Vec<ChildStdin> = Vec::with_capacity(self.count);
        let mut running = FuturesUnordered::new();

        for _ in 0..self.count {
            let mut child = match self.launcher.spawn() {
                Ok(child) => child,
                Err(e) => {
                    error!(error = %e, started = running.len(), "Failed to start worker pool");
                    stdins.clear();
                    while running.next().await.is_some() {}
                    return Err(e);
                }
            };

            let pid = child.id();
            if let Some(stdin) = child.stdin.take() {
                stdins.push(stdin);
            }
            info!(pid = ?pid, "Worker process started");

            running.push(async move {
                let status = child.wait().await;
                (pid, status)
            });
        }

        info!(count = self.count, "Worker pool running");

        let mut report = PoolReport::default();
        let mut stopping = false;

        loop {
            tokio::select! {
                () = cancel.cancelled(), if !stopping => {
                    info!(workers = running.len(), "Stopping worker pool");
                    stopping = true;
                    stdins.clear();
                }
                next = running.next() => {
                    let Some((pid, status)) = next else { break };
                    let exit = match status {
                        Ok(status) => WorkerExit { pid, exit_code: status.code() },
                        Err(e) => {
                            warn!(pid = ?pid, error = %e, "Failed to wait for worker process");
                            WorkerExit { pid, exit_code: None }
                        }
                    };

                    if exit.success() {
                        info!(pid = ?pid, "Worker process exited");
                    } else {
                        warn!(pid = ?pid, exit_code = ?exit.exit_code, "Worker process exited abnormally");
                    }
                    report.workers.push(exit);
                }
            }
        }

        info!(
            workers = report.workers.len(),
            failed = report.failed().len(),
            "Worker pool stopped"
        );
        Ok(report)
    }
}
