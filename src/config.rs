//! Application configuration.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. `config/default.{toml,...}` (optional)
//! 2. `config/{RUN_MODE}.{toml,...}` (optional, `RUN_MODE` defaults to
//!    `development`)
//! 3. `LEDGER__*` environment variables, e.g. `LEDGER__SERVER__PORT=9000`

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::middleware::LogRequests;
use crate::router::RouterConfig;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// HS256 token validation. Without it every request is anonymous.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-request deadline. Unset means no deadline.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// `host:port`, ready for [`Server::bind`](crate::Server::bind).
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    crate::server::DEFAULT_MAX_BODY_BYTES
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Paths excluded from request logging in addition to the ping route.
    #[serde(default)]
    pub ignore_paths: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::default(), filter: default_filter(), ignore_paths: Vec::new() }
    }
}

fn default_filter() -> String {
    "info".to_owned()
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"[hidden]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl AppConfig {
    /// Loads configuration from config files and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a source cannot be read or the merged
    /// result does not deserialize.
    pub fn load() -> Result<Self, Error> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_owned());

        let config = ::config::Config::builder()
            .add_source(::config::File::with_name("config/default").required(false))
            .add_source(::config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(::config::Environment::with_prefix("LEDGER").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parses a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from_str(source, ::config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Default-middleware settings derived from this configuration.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            log_requests: LogRequests::from(&self.log),
            request_timeout: self.server.request_timeout(),
            ..RouterConfig::default()
        }
    }
}
