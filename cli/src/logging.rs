//! Tracing setup for the arbor CLI
//!
//! Logs go to <logs_dir>/arbor.log (see `PathManager::log_file_path`). When no
//! log file can be opened, they go to stderr instead. `--tracing` mirrors
//! them to stderr as well.

use config::PathManager;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,arbor_core=debug,arbor=debug";

fn filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or(DEFAULT_FILTER)))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the program.
pub fn init_logging(configured_filter: Option<&str>, mirror_to_stderr: bool) -> Option<WorkerGuard> {
    let file = PathManager::log_file_path().and_then(|path| match open_log_file(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("[arbor] Failed to open log file {:?}: {}", path, e);
            None
        }
    });

    let Some(file) = file else {
        init_stderr_logging(configured_filter);
        return None;
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let subscriber = tracing_subscriber::registry()
        .with(filter(configured_filter))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(mirror_to_stderr.then(|| fmt::layer().with_writer(std::io::stderr)));

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => tracing::info!("Logging initialized"),
        Err(e) => eprintln!("[arbor] Failed to set tracing subscriber: {}", e),
    }
    Some(guard)
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_stderr_logging(configured_filter: Option<&str>) {
    let subscriber = tracing_subscriber::registry().with(filter(configured_filter)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
