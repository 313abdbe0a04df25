use std::fs;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "studyroom.log";

/// `RUST_LOG` when set, otherwise the configured level
pub fn build_env_filter(config: &LogConfig) -> EnvFilter {
    let default_level = config.level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy()
    })
}

/// Installs the global subscriber.
///
/// With a log directory, output goes to a daily-rolling file through a
/// non-blocking writer; the returned guard must be held until exit so that
/// buffered lines are flushed. Otherwise output goes to stderr, keeping
/// stdout for the transcript.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_env_filter(config);

    match &config.directory {
        Some(directory) => {
            fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory {}", directory.display())
            })?;

            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .context("Failed to install tracing subscriber")?;

            Ok(Some(guard))
        },
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install tracing subscriber")?;

            Ok(None)
        },
    }
}
