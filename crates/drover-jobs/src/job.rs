//! Job model.

use crate::error::{JobError, JobResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller-supplied job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker and executing.
    Processing,
    /// Finished with exit status 0.
    Completed,
    /// Last run failed; claimable again once `run_after` has passed.
    Failed,
    /// Retry budget exhausted. Terminal.
    Dead,
}

impl JobState {
    /// Every state, in lifecycle order.
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    /// The persisted representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }

    /// True if a worker may claim a job in this state (subject to `run_after`).
    pub const fn is_claimable(self) -> bool {
        matches!(self, JobState::Pending | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| JobError::Internal(format!("unknown job state: {s}")))
    }
}

/// A persisted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    /// Number of execution cycles that ended with a non-zero status.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Not claimable before this instant.
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The part of a job handed to the worker that claimed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: JobId,
    pub command: String,
    pub attempts: u32,
}

/// Validated enqueue request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewJob {
    pub id: JobId,
    pub command: String,
}

impl NewJob {
    /// Creates a validated job; blank ids or commands are rejected.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> JobResult<Self> {
        let id = id.into();
        let command = command.into();

        if id.trim().is_empty() {
            return Err(JobError::InvalidJob("job must contain a non-empty id".to_string()));
        }
        if command.trim().is_empty() {
            return Err(JobError::InvalidJob(
                "job must contain a non-empty command".to_string(),
            ));
        }

        Ok(Self {
            id: JobId(id),
            command,
        })
    }

    /// Parses `{"id": "...", "command": "..."}`.
    ///
    /// Integer ids are accepted and stored as their decimal text. Extra
    /// fields are ignored.
    pub fn from_json(input: &str) -> JobResult<Self> {
        let value: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| JobError::InvalidJob(format!("invalid JSON: {e}")))?;

        let object = value
            .as_object()
            .ok_or_else(|| JobError::InvalidJob("job must be a JSON object".to_string()))?;

        let id = match object.get("id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            Some(_) => {
                return Err(JobError::InvalidJob("job id must be a string".to_string()));
            }
            None => return Err(JobError::InvalidJob("job must contain an id".to_string())),
        };

        let command = match object.get("command") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(JobError::InvalidJob(
                    "job command must be a string".to_string(),
                ));
            }
            None => {
                return Err(JobError::InvalidJob(
                    "job must contain a command".to_string(),
                ));
            }
        };

        Self::new(id, command)
    }
}

/// Converts a timestamp to the persisted form (unix milliseconds).
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Converts persisted unix milliseconds back to a timestamp.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
