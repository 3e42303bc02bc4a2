//! Daemon configuration.
//!
//! Configuration arrives on the command line; the daemon is single-purpose
//! enough that no layered configuration files are involved. The socket
//! endpoint model mirrors the listener's two transports.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    Json,
    /// Human-readable single line output.
    #[default]
    Compact,
}

/// Declarative configuration for the daemon socket.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Socket file path.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host to bind.
        host: String,
        /// Port to bind.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Returns the Unix socket path when the endpoint uses that transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

/// Errors raised while assembling the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The log format flag did not name a known format.
    #[error("unknown log format: {value}")]
    UnknownLogFormat {
        /// The rejected flag value.
        value: String,
    },
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    socket: SocketEndpoint,
    log_filter: String,
    log_format: LogFormat,
    endpoint: String,
    batching_enabled: bool,
}

impl Config {
    /// Loads configuration from the process command line.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a flag value fails to parse beyond
    /// what the argument parser already enforces.
    pub fn load() -> Result<Self, ConfigError> {
        Cli::parse().into_config()
    }

    /// The socket endpoint to serve on.
    #[must_use]
    pub const fn socket(&self) -> &SocketEndpoint {
        &self.socket
    }

    /// The tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// The log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// The mount prefix procedures are served under.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether `?batch=1` requests are honored.
    #[must_use]
    pub const fn batching_enabled(&self) -> bool {
        self.batching_enabled
    }

    /// Replaces the socket endpoint (used by tests to bind ephemeral
    /// ports).
    #[must_use]
    pub fn with_socket(mut self, socket: SocketEndpoint) -> Self {
        self.socket = socket;
        self
    }

    /// Toggles `?batch=1` handling.
    #[must_use]
    pub const fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: SocketEndpoint::tcp("127.0.0.1", 7411),
            log_filter: "info".to_owned(),
            log_format: LogFormat::default(),
            endpoint: "rpc".to_owned(),
            batching_enabled: true,
        }
    }
}

/// Command-line interface of the daemon.
#[derive(Debug, Parser)]
#[command(name = "spindled", about = "Spindle procedure-call daemon", version)]
struct Cli {
    /// TCP host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port to bind.
    #[arg(long, default_value_t = 7411)]
    port: u16,

    /// Unix socket path; overrides the TCP endpoint when set.
    #[arg(long)]
    socket_path: Option<String>,

    /// Tracing filter expression (for example `info,spindled=debug`).
    #[arg(long, default_value = "info")]
    log_filter: String,

    /// Log output format: `json` or `compact`.
    #[arg(long, default_value = "compact")]
    log_format: String,

    /// Mount prefix procedures are served under.
    #[arg(long, default_value = "rpc")]
    endpoint: String,

    /// Refuse `?batch=1` requests.
    #[arg(long)]
    no_batching: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config, ConfigError> {
        let log_format =
            LogFormat::from_str(&self.log_format).map_err(|_| ConfigError::UnknownLogFormat {
                value: self.log_format.clone(),
            })?;
        let socket = match self.socket_path {
            Some(path) => SocketEndpoint::unix(path),
            None => SocketEndpoint::tcp(self.host, self.port),
        };
        Ok(Config {
            socket,
            log_filter: self.log_filter,
            log_format,
            endpoint: self.endpoint,
            batching_enabled: !self.no_batching,
        })
    }
}
