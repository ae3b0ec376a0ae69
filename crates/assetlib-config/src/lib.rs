//! Shared configuration for the asset library server and its clients.
//!
//! Configuration is layered by `ortho_config`: built-in defaults are
//! overridden by a TOML file, which is overridden by `ASSETLIB_*` environment
//! variables, which are in turn overridden by command-line flags. The file is
//! named with `--config-path` or `ASSETLIB_CONFIG_PATH`, or discovered in the
//! usual per-user locations.
//!
//! Four endpoints make up the protocol: the server's control and command
//! sockets, and the client's inbound socket (bound locally) together with the
//! address the server should dial to reach it.

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CLIENT_PORT, DEFAULT_COMMAND_PORT, DEFAULT_CONTROL_PORT, DEFAULT_HISTORY_LIMIT,
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT_SECS, default_client_socket,
    default_command_socket, default_control_socket, default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Flags understood by the configuration loader. Binaries that accept their
/// own arguments forward only these, and only when they lead the command
/// line.
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--control-socket",
    "--command-socket",
    "--client-socket",
    "--client-advertise",
    "--log-filter",
    "--log-format",
    "--request-timeout-secs",
    "--history-limit",
];

/// Resolved configuration shared by `assetlibd` and `assetlib`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "ASSETLIB")]
pub struct Config {
    /// Endpoint receiving client registrations and `clients` queries.
    #[ortho_config(default = default_control_socket())]
    pub control_socket: SocketEndpoint,
    /// Endpoint receiving command submissions.
    #[ortho_config(default = default_command_socket())]
    pub command_socket: SocketEndpoint,
    /// Endpoint a client binds to receive asynchronous results.
    #[ortho_config(default = default_client_socket())]
    pub client_socket: SocketEndpoint,
    /// Endpoint the server dials to reach the client, when it differs from
    /// the bound address (for example a wildcard bind behind a host name).
    pub client_advertise: Option<SocketEndpoint>,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter().to_owned())]
    pub log_filter: String,
    /// Output format for log events.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Seconds a blocking receive waits before giving up; `0` waits forever.
    #[ortho_config(default = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
    /// Number of executed commands retained for the `history` query.
    #[ortho_config(default = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_socket: default_control_socket(),
            command_socket: default_command_socket(),
            client_socket: default_client_socket(),
            client_advertise: None,
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Config {
    /// Resolves configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// See [`Config::resolve_from_iter`].
    pub fn resolve() -> Result<Self, ConfigError> {
        Self::resolve_from_iter(std::env::args_os())
    }

    /// Resolves configuration from an explicit argument list, whose first
    /// item is the binary name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a flag, variable or file cannot be
    /// read, and [`ConfigError::Invalid`] when the merged values are
    /// inconsistent.
    pub fn resolve_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::load_from_iter(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Server endpoint for registrations.
    #[must_use]
    pub const fn control_socket(&self) -> &SocketEndpoint {
        &self.control_socket
    }

    /// Server endpoint for command submission.
    #[must_use]
    pub const fn command_socket(&self) -> &SocketEndpoint {
        &self.command_socket
    }

    /// Endpoint the client binds for inbound results.
    #[must_use]
    pub const fn client_socket(&self) -> &SocketEndpoint {
        &self.client_socket
    }

    /// Endpoint advertised to the server; falls back to [`Self::client_socket`].
    #[must_use]
    pub fn client_advertise(&self) -> &SocketEndpoint {
        self.client_advertise.as_ref().unwrap_or(&self.client_socket)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Timeout applied to blocking receives, or `None` to wait indefinitely.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_secs))
        }
    }

    /// Capacity of the executed-command history.
    #[must_use]
    pub const fn history_limit(&self) -> usize {
        self.history_limit
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "log_filter",
                message: "filter expression is empty".to_owned(),
            });
        }
        if self.control_socket == self.command_socket {
            return Err(ConfigError::Invalid {
                field: "command_socket",
                message: format!("must differ from control socket {}", self.control_socket),
            });
        }
        Ok(())
    }
}

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration layer could not be read or merged.
    #[error(transparent)]
    Load(#[from] Arc<OrthoError>),
    /// A resolved value failed validation.
    #[error("invalid value for {field}: {message}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Reason the value was rejected.
        message: String,
    },
}
