//! Diagnostic logging setup

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const LOG_FILE_PREFIX: &str = "concierge.log";

/// Filter for `-v` occurrences; `RUST_LOG` wins when set.
pub fn env_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber: stderr always, plus a daily-rolled file
/// in `log_dir` when given.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stderr)
        .with(file)
        .init();

    guard
}
