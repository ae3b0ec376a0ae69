use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Host the server binds and clients dial by default.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for client registration and `clients` queries.
pub const DEFAULT_CONTROL_PORT: u16 = 7000;

/// Default TCP port for command submission.
pub const DEFAULT_COMMAND_PORT: u16 = 7001;

/// Default TCP port a client binds to receive asynchronous results.
pub const DEFAULT_CLIENT_PORT: u16 = 6002;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default number of seconds a blocking receive waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default capacity of the executed-command history ring.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Well-known control endpoint of the server.
#[must_use]
pub fn default_control_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_CONTROL_PORT)
}

/// Well-known command submission endpoint of the server.
#[must_use]
pub fn default_command_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_COMMAND_PORT)
}

/// Endpoint a client binds for result delivery.
#[must_use]
pub fn default_client_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_CLIENT_PORT)
}
