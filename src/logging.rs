//! Logging configuration with rotation support
//!
//! # Example
//!
//! ```rust,no_run
//! use agentry::logging::init_logging;
//!
//! init_logging("logs", "agentry.log", "info").unwrap();
//! ```

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Initialize logging with daily file rotation plus a compact stdout layer.
///
/// - `directory`: Directory to store logs
/// - `filename_prefix`: Prefix for log files (e.g. "agentry.log")
/// - `level`: Default log level, overridable via `RUST_LOG`
pub fn init_logging(directory: &str, filename_prefix: &str, level: &str) -> Result<()> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(filename_prefix)
        .build(directory)
        .map_err(|e| Error::Internal(format!("Failed to create log appender: {e}")))?;

    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to init tracing: {e}")))?;

    Ok(())
}
