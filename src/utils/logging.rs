use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::utils::error::{AppError, Result};

const LOG_FILE_PREFIX: &str = "sweeper.log";

/// Builds the filter: `RUST_LOG` wins, then `-v`, then the configured level.
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = if verbose { "uatu_sweeper=debug" } else { config.level.as_str() };
    EnvFilter::try_new(directive)
        .map(|filter| filter.add_directive(tracing::Level::WARN.into()))
        .map_err(|e| AppError::InvalidInput(format!("Invalid log filter '{}': {}", directive, e)))
}

/// Installs the global subscriber. The returned guard must be held for the
/// life of the process when file logging is enabled, or buffered lines are
/// lost on exit.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config, verbose)?;
    let console = fmt::layer().with_target(true);

    match &config.directory {
        Some(directory) => {
            fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_target(true).with_ansi(false).with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()
                .map_err(|e| AppError::InvalidInput(format!("Logging already initialised: {}", e)))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .map_err(|e| AppError::InvalidInput(format!("Logging already initialised: {}", e)))?;
            Ok(None)
        }
    }
}
