//! Retry policy for failed jobs.
//!
//! Exponential backoff in whole seconds: the n-th failure waits
//! `backoff_base ^ n` seconds before the job is claimable again, and the
//! failure that brings `attempts` up to `max_retries` dead-letters it.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

/// Default number of failing attempts before a job is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Base of the exponential delay, in seconds.
    pub backoff_base: u32,

    /// Failing attempts allowed before the job is dead.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES)
    }
}

/// Outcome of evaluating a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reschedule: the job becomes claimable again at `run_after`.
    Retry {
        attempts: u32,
        run_after: DateTime<Utc>,
    },
    /// Retry budget exhausted.
    Dead { attempts: u32 },
}

impl RetryDecision {
    /// The attempt count to persist.
    pub fn attempts(&self) -> u32 {
        match *self {
            RetryDecision::Retry { attempts, .. } | RetryDecision::Dead { attempts } => attempts,
        }
    }

    /// True if the job is dead-lettered.
    pub fn is_dead(&self) -> bool {
        matches!(self, RetryDecision::Dead { .. })
    }
}

impl RetryPolicy {
    /// Creates an exponential backoff retry policy.
    pub fn exponential(backoff_base: u32, max_retries: u32) -> Self {
        Self {
            backoff_base,
            max_retries,
        }
    }

    /// Builds a policy from raw runtime settings.
    ///
    /// Negative values are clamped to zero: a zero base retries
    /// immediately, zero retries dead-letters on the first failure.
    pub fn from_settings(backoff_base: i64, max_retries: i64) -> Self {
        let clamp = |v: i64| u32::try_from(v.max(0)).unwrap_or(u32::MAX);
        Self::exponential(clamp(backoff_base), clamp(max_retries))
    }

    /// Delay before the job may run again after its `attempts`-th failure.
    ///
    /// Saturates instead of overflowing.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        Duration::from_secs(u64::from(self.backoff_base).saturating_pow(attempts))
    }

    /// Decides what happens to a job that just failed.
    ///
    /// `attempts_before` is the count stored before this failure.
    pub fn evaluate(&self, attempts_before: u32, failed_at: DateTime<Utc>) -> RetryDecision {
        let attempts = attempts_before.saturating_add(1);

        if attempts >= self.max_retries {
            return RetryDecision::Dead { attempts };
        }

        let delay = self.delay_for_attempt(attempts);
        let run_after = i64::try_from(delay.as_secs())
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| failed_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        RetryDecision::Retry {
            attempts,
            run_after,
        }
    }
}
