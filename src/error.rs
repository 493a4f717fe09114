//! Unified infrastructure error type.

use thiserror::Error;

/// The error type returned by the crate's fallible setup and serving
/// operations.
///
/// Request-level failures (404, 400, 401, ...) are expressed as
/// [`ApiError`](crate::ApiError) values and rendered into responses; they
/// never surface here. This type covers binding a port, accepting
/// connections, loading configuration and installing the log subscriber.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("config: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("logging: {0}")]
    Logging(String),
}
