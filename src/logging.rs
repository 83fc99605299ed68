//! Logging infrastructure for gurney
//!
//! Structured, multi-target logging with daily file rotation. Events go to the
//! console and to rolling files under the gurney data directory.
//!
//! - `gurney.<date>.log`: every level allowed by the env filter
//! - `error.<date>.log`: warnings and errors only
//!
//! ```no_run
//! use gurney::logging;
//!
//! // Initialize once at startup
//! logging::init().expect("Failed to initialize logging");
//!
//! tracing::info!(analyzer = "clinico", "Analyzer started");
//! ```

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Number of rotated files kept per log.
const MAX_LOG_FILES: usize = 10;

/// Gets the log directory, creating it when missing.
pub fn get_log_dir() -> Result<PathBuf> {
    let log_dir = crate::utils::standard_paths().logs_dir;

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn appender(log_dir: &std::path::Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} file appender"))
}

/// Initializes the logging system with console and file output
///
/// The default level is INFO; `RUST_LOG` overrides it.
///
/// # Errors
///
/// Returns error if log directory cannot be created or file appenders fail
pub fn init() -> Result<()> {
    let log_dir = get_log_dir()?;

    let all_logs_appender = appender(&log_dir, "gurney")?;
    let error_logs_appender = appender(&log_dir, "error")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_writer(std::io::stderr)
        .pretty();

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!("Logging initialized, log directory: {:?}", log_dir);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_exists_after_lookup() {
        let dir = get_log_dir().expect("Failed to get log directory");
        assert!(dir.is_dir());
        assert!(dir.ends_with("logs"));
    }
}
