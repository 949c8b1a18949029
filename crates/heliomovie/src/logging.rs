//! Process-wide log setup.
//!
//! `log` records from the store and worker pool are bridged into `tracing`,
//! so one subscriber receives everything.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Logging is already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Filter from `RUST_LOG` when set, otherwise from the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    filter_from(&config.level, std::env::var("RUST_LOG").ok())
}

fn filter_from(level: &str, env: Option<String>) -> Result<EnvFilter, LoggingError> {
    let directives = match env {
        Some(env) if !env.trim().is_empty() => env,
        _ => level.to_string(),
    };
    EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter {
        filter: directives.clone(),
        message: e.to_string(),
    })
}

/// Installs the global subscriber. Fails if called twice.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    tracing_log::LogTracer::init().map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    let result = match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            Registry::default().with(filter).with(fmt::layer()),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_current_span(true)),
        ),
    };
    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
