//! Logging setup.
//!
//! The library only emits `tracing` events; binaries call [`init`] once to
//! install a subscriber. `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingSettings};

/// Error returned when the subscriber cannot be installed.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("cannot install log subscriber: {0}")]
    Install(String),
}

/// Build the level filter, preferring `RUST_LOG` when set.
pub fn filter(settings: &LoggingSettings) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.level)
            .map_err(|e| LoggingError::InvalidFilter(settings.level.clone(), e.to_string())),
    }
}

/// Install a global subscriber writing to stderr.
pub fn init(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = filter(settings)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match settings.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| LoggingError::Install(e.to_string()))?;
    tracing::debug!(level = %settings.level, format = ?settings.format, "logging initialized");
    Ok(())
}
