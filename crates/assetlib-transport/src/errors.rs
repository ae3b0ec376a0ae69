//! Error types for listeners and producers.

use std::io;
use std::net::SocketAddr;

use assetlib_config::SocketPreparationError;
use assetlib_protocol::CodecError;
use thiserror::Error;

/// Errors surfaced while binding or running a socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host name resolution failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Host being resolved.
        host: String,
        /// Requested port.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// Resolution returned no usable address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Host being resolved.
        host: String,
        /// Requested port.
        port: u16,
    },
    /// Binding the TCP listener failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address being bound.
        addr: SocketAddr,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// The bound address could not be read back.
    #[error("failed to read local address of {endpoint}: {source}")]
    LocalAddress {
        /// Endpoint that was bound.
        endpoint: String,
        /// Lookup failure.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The socket directory could not be prepared.
    #[error(transparent)]
    Prepare(#[from] SocketPreparationError),
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Requested endpoint.
        endpoint: String,
    },
    /// Binding the Unix listener failed.
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// Another process is serving the socket.
    #[cfg(unix)]
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// A non-socket file occupies the path.
    #[cfg(unix)]
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// Occupied path.
        path: String,
    },
    /// The existing socket file could not be inspected.
    #[cfg(unix)]
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        /// Socket path.
        path: String,
        /// Metadata failure.
        #[source]
        source: io::Error,
    },
    /// Probing an existing socket failed unexpectedly.
    #[cfg(unix)]
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        /// Socket path.
        path: String,
        /// Probe failure.
        #[source]
        source: io::Error,
    },
    /// A stale socket file could not be removed.
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Removal failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Errors surfaced by a [`crate::Producer`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint's host could not be resolved.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// Endpoint being resolved.
        endpoint: String,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// Connecting to the endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint being dialled.
        endpoint: String,
        /// Connection failure.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Requested endpoint.
        endpoint: String,
    },
    /// Socket options could not be applied.
    #[error("failed to configure connection to {endpoint}: {source}")]
    Configure {
        /// Connected endpoint.
        endpoint: String,
        /// Option failure.
        #[source]
        source: io::Error,
    },
    /// No reply arrived within the configured timeout.
    #[error("timed out waiting for {endpoint}")]
    Timeout {
        /// Peer endpoint.
        endpoint: String,
    },
    /// The peer closed the connection before replying.
    #[error("connection to {endpoint} closed")]
    Disconnected {
        /// Peer endpoint.
        endpoint: String,
    },
    /// Framing or IO failed on the connection.
    #[error("exchange with {endpoint} failed: {source}")]
    Codec {
        /// Peer endpoint.
        endpoint: String,
        /// Codec failure.
        #[source]
        source: CodecError,
    },
    /// A send was attempted while the previous reply is still unread.
    #[error("a reply from {endpoint} is still pending")]
    ReplyPending {
        /// Peer endpoint.
        endpoint: String,
    },
    /// A receive was attempted with no request outstanding.
    #[error("no request to {endpoint} is awaiting a reply")]
    NoRequestPending {
        /// Peer endpoint.
        endpoint: String,
    },
}

impl TransportError {
    /// Whether the error came from an expired timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
