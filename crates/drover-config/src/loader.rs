//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use drover_core::DroverError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{dir}/default.toml` - Default values
    /// 2. `{dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{dir}/local.toml` - Local overrides
    /// 4. Environment variables with `DROVER__` prefix (`DROVER__DATABASE__PATH`)
    ///
    /// Missing files are skipped; with no sources at all the built-in
    /// defaults are used.
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self, DroverError> {
        let config = Self::load_config(&config_dir.into())?;

        Ok(Self { config })
    }

    /// Returns the loaded configuration.
    #[must_use]
    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// Consumes the loader, returning the configuration.
    #[must_use]
    pub fn into_inner(self) -> AppConfig {
        self.config
    }

    fn load_config(config_dir: &Path) -> Result<AppConfig, DroverError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("DROVER_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        debug!(environment = %environment, dir = %config_dir.display(), "Loading configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = config_dir.join(format!("{name}.toml"));
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DROVER")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(config_error_to_drover_error)?;

        ConfigValidator::validate(&app_config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            DroverError::Configuration(joined)
        })?;

        Ok(app_config)
    }
}

fn config_error_to_drover_error(err: ConfigError) -> DroverError {
    DroverError::Configuration(err.to_string())
}
