//! Global tracing subscriber setup.
//!
//! `log` records (the job store logs through `log`) are forwarded into
//! `tracing` via `tracing-log`, so one subscriber sees everything.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to install log bridge: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("A global tracing subscriber is already set: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the process-wide subscriber. `RUST_LOG` wins over
/// `config.level`. Call once, at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let (json_layer, plain_layer) = if config.json {
        (Some(fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer);

    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_invalid_level_is_rejected_before_install() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "draftsmith=verbose".to_string(),
            json: false,
        };

        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::InvalidFilter(_))
        ));
    }
}
