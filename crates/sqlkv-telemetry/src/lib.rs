//! Logging setup for sqlkv.
//!
//! The store crate only emits `tracing` events. Binaries and tests that want
//! to see them install a subscriber through this crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlkv_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), sqlkv_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("sqlkv_store=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
