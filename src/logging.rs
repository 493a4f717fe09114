//! Process-wide log subscriber.

use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};
use crate::error::Error;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter. In JSON format every event
/// carries the fields of its request span (method, path, request ID).
///
/// # Errors
///
/// Returns [`Error::Logging`] for an invalid filter or when a global
/// subscriber is already installed.
pub fn init(cfg: &LogConfig) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.filter)
            .map_err(|e| Error::Logging(format!("invalid filter `{}`: {e}", cfg.filter)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = match cfg.format {
        LogFormat::Json => builder.json().with_current_span(true).with_span_list(false).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| Error::Logging(e.to_string()))
}
