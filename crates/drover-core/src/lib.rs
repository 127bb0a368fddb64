//! # Drover Core
//!
//! Shared error definitions and tracing initialisation used by every
//! crate in the Drover workspace.

pub mod error;
pub mod telemetry;

pub use error::*;
pub use telemetry::{init_tracing, TelemetryConfig};
