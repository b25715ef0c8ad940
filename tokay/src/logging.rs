//! Logging infrastructure for the bridge.
//!
//! Structured logging via `tracing`:
//! - always prints to stdout
//! - additionally writes a daily-rolling `tokay.log` when the config names
//!   a log directory
//! - `RUST_LOG` wins over the verbosity level when set

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file name inside the configured log directory.
const LOG_FILE: &str = "tokay.log";

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Map the `-V` verbosity level onto a default filter.
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system.
///
/// # Arguments
///
/// * `verbosity` - effective `-V` level (config may have raised it)
/// * `log_dir` - directory for the rolling log file, if any
///
/// # Errors
///
/// Returns an error when the log directory cannot be created.
pub fn init_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<LoggingGuard, io::Error> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    let file_guard = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
            None
        }
    };

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(default_filter(0), "info");
        assert_eq!(default_filter(1), "debug");
        assert_eq!(default_filter(2), "trace");
        assert_eq!(default_filter(9), "trace");
    }

    #[test]
    fn log_directory_is_created_on_demand() {
        // init_logging itself can only run once per process (global
        // subscriber), so only the directory handling is exercised here
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("logs/deep");

        std::fs::create_dir_all(&nested).unwrap();
        assert!(nested.exists());
    }
}
