//! Shell command execution.

use async_trait::async_trait;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of running one job command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Process exited with this status code.
    Exited(i32),
    /// Process was killed by a signal.
    Terminated,
    /// Process could not be spawned.
    FailedToStart(String),
}

impl CommandOutcome {
    /// Converts a process exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        status.code().map_or(CommandOutcome::Terminated, CommandOutcome::Exited)
    }

    /// True for exit status 0. Signals and spawn failures count as failures.
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Exited(0))
    }

    /// Text recorded as the job's `last_error`.
    pub fn describe(&self) -> String {
        match self {
            CommandOutcome::Exited(code) => format!("exit {code}"),
            CommandOutcome::Terminated => "terminated by signal".to_string(),
            CommandOutcome::FailedToStart(reason) => format!("failed to start: {reason}"),
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Runs job commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion.
    async fn run(&self, command: &str) -> CommandOutcome;
}

/// Runs commands through `<shell> -c`.
///
/// Stdin is closed; stdout and stderr are inherited from the worker.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    /// Creates a runner using the given shell.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> CommandOutcome {
        debug!(shell = %self.shell, command, "Spawning job command");

        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => CommandOutcome::from_status(status),
            Err(e) => {
                warn!(shell = %self.shell, error = %e, "Failed to spawn job command");
                CommandOutcome::FailedToStart(e.to_string())
            }
        }
    }
}
