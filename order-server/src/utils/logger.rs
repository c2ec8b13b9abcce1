//! Logging Infrastructure
//!
//! `RUST_LOG` overrides the configured level. With a log directory, output
//! goes to a daily rolling file instead of stdout.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logger (stdout, info)
pub fn init_logger() {
    // A global subscriber may already be installed (tests)
    let _ = init_logger_with_file(None, false, None);
}

/// Initialize the logger with optional JSON formatting and file output
pub fn init_logger_with_file(
    log_level: Option<&str>,
    json: bool,
    log_dir: Option<&str>,
) -> Result<(), TryInitError> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = log_dir.and_then(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => Some(tracing_appender::rolling::daily(dir, "order-server")),
        Err(e) => {
            eprintln!("Log directory {dir} unavailable ({e}), logging to stdout");
            None
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match (json, file_appender) {
        (true, Some(writer)) => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        (true, None) => registry.with(fmt::layer().json()).try_init(),
        (false, Some(writer)) => registry
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(writer),
            )
            .try_init(),
        (false, None) => registry.with(fmt::layer().with_target(false)).try_init(),
    }
}
