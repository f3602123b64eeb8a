//! Log setup. The terminal belongs to the UI, so logs only go to a file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, Result};

/// Install a file-backed subscriber.
///
/// `RUST_LOG` wins over `level`. The returned guard flushes pending lines on
/// drop and must be held for the life of the program.
pub fn init(file: &Path, level: &str) -> Result<WorkerGuard> {
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = file
        .file_name()
        .ok_or_else(|| AppError::InvalidPath(format!("{} is not a file", file.display())))?;
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .with_env_filter(filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Logging(format!("a subscriber is already installed: {e}")))?;
    Ok(guard)
}
