//! Tracing setup: console output plus optional daily-rotated log files.

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Log file names are `a2a_bridge.<date>.log`.
const LOG_FILE_PREFIX: &str = "a2a_bridge";
const LOG_FILE_SUFFIX: &str = "log";

/// Filter used when nothing else sets one.
pub const DEFAULT_FILTER: &str = "a2a_bridge=info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`, which wins over the config file. The
/// returned guard flushes the file writer on drop; hold it until exit.
pub fn init(config: &LoggingConfig, level: Option<&str>) -> Result<Option<WorkerGuard>, LoggingError> {
    let fallback = level
        .or(config.level.as_deref())
        .unwrap_or(DEFAULT_FILTER);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(fallback)?,
    };

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(dir, config.max_files)?);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

/// Daily-rotated appender in `dir`, keeping at most `max_files` files.
pub fn file_appender(dir: &Path, max_files: usize) -> Result<RollingFileAppender, LoggingError> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(max_files)
        .build(dir)?;
    Ok(appender)
}
