//! Configuration validation.
//!
//! Collects every problem in one pass so that a misconfigured deployment
//! fails fast with the complete list.

use crate::AppConfig;
use std::fmt;

/// Upper bound on worker processes per pool, from config or the command line.
pub const MAX_WORKER_COUNT: usize = 64;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Database path is empty.
    EmptyDatabasePath,
    /// A count or pool size must be at least one.
    ZeroValue { name: String },
    /// Pool size exceeds maximum allowed.
    PoolSizeTooLarge { value: u32, maximum: u32 },
    /// Worker count exceeds maximum allowed.
    WorkerCountTooLarge { value: usize, maximum: usize },
    /// Timeout or interval must be positive.
    NonPositiveTimeout { name: String },
    /// Shell used for job commands is empty.
    EmptyShell,
    /// Log level is invalid.
    InvalidLogLevel { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDatabasePath => write!(f, "database.path cannot be empty"),
            Self::ZeroValue { name } => write!(f, "{name} must be at least 1"),
            Self::PoolSizeTooLarge { value, maximum } => {
                write!(f, "Pool size {value} exceeds maximum allowed ({maximum})")
            }
            Self::WorkerCountTooLarge { value, maximum } => {
                write!(f, "worker.count {value} exceeds maximum allowed ({maximum})")
            }
            Self::NonPositiveTimeout { name } => write!(f, "Timeout '{name}' must be positive"),
            Self::EmptyShell => write!(f, "worker.shell cannot be empty"),
            Self::InvalidLogLevel { value } => write!(
                f,
                "Invalid log level: '{value}' (valid: trace, debug, info, warn, error)"
            ),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: u32 = 64;
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_database(&config.database, &mut errors);
        Self::validate_worker(&config.worker, &mut errors);
        Self::validate_logging(&config.logging, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_database(config: &crate::DatabaseConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.path.as_os_str().is_empty() {
            errors.push(ConfigValidationError::EmptyDatabasePath);
        }

        if config.max_connections == 0 {
            errors.push(ConfigValidationError::ZeroValue {
                name: "database.max_connections".to_string(),
            });
        } else if config.max_connections > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::PoolSizeTooLarge {
                value: config.max_connections,
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        if config.busy_timeout_ms == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "database.busy_timeout_ms".to_string(),
            });
        }
        if config.connect_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "database.connect_timeout_secs".to_string(),
            });
        }
    }

    fn validate_worker(config: &crate::WorkerConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.count == 0 {
            errors.push(ConfigValidationError::ZeroValue {
                name: "worker.count".to_string(),
            });
        } else if config.count > MAX_WORKER_COUNT {
            errors.push(ConfigValidationError::WorkerCountTooLarge {
                value: config.count,
                maximum: MAX_WORKER_COUNT,
            });
        }
        if config.poll_interval_ms == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "worker.poll_interval_ms".to_string(),
            });
        }
        if config.shell.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyShell);
        }
    }

    fn validate_logging(
        config: &drover_core::TelemetryConfig,
        errors: &mut Vec<ConfigValidationError>,
    ) {
        let level = config.level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.level.clone(),
            });
        }
    }
}
