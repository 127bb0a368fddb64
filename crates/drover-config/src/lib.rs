//! # Drover Config
//!
//! Static configuration for Drover, layered from TOML files, a `.env`
//! file and `DROVER__*` environment variables.
//!
//! Runtime-tunable retry settings (`max_retries`, `backoff_base`) are not
//! part of this crate; they live in the job database so that a change
//! applies to already-running workers.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
