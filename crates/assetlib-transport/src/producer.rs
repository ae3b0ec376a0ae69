//! Connecting half of a channel pair.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use assetlib_config::SocketEndpoint;
use assetlib_protocol::{CodecError, Message, read_message, write_message};
use tracing::debug;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::{Connection, TRANSPORT_TARGET, TransportError};

/// Upper bound on establishing a connection.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of a request/reply exchange.
///
/// Sends and receives strictly alternate: a second request cannot be sent
/// until the reply to the first has been read.
#[derive(Debug)]
pub struct Producer {
    endpoint: SocketEndpoint,
    reader: BufReader<Connection>,
    writer: Connection,
    awaiting_reply: bool,
}

/// Connects a producer to `endpoint`. See [`Producer::connect`].
///
/// # Errors
///
/// Returns [`TransportError`] if the connection cannot be established.
pub fn create_producer(
    endpoint: &SocketEndpoint,
    timeout: Option<Duration>,
) -> Result<Producer, TransportError> {
    Producer::connect(endpoint, timeout)
}

impl Producer {
    /// Connects to `endpoint` within [`CONNECTION_TIMEOUT`].
    ///
    /// `timeout` bounds every later send and receive; `None` waits forever.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when resolution, connection or socket
    /// configuration fails.
    pub fn connect(
        endpoint: &SocketEndpoint,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let writer = open(endpoint)?;
        let configure = |source| TransportError::Configure {
            endpoint: endpoint.to_string(),
            source,
        };
        writer.set_read_timeout(timeout).map_err(configure)?;
        writer.set_write_timeout(timeout).map_err(configure)?;
        let reader = writer.try_clone().map_err(configure)?;
        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %endpoint,
            "producer connected"
        );
        Ok(Self {
            endpoint: endpoint.clone(),
            reader: BufReader::new(reader),
            writer,
            awaiting_reply: false,
        })
    }

    /// The peer endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Whether a sent request still waits for its reply.
    #[must_use]
    pub const fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// Sends one request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ReplyPending`] if the previous reply has not
    /// been read, or a transport error if writing fails.
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if self.awaiting_reply {
            return Err(TransportError::ReplyPending {
                endpoint: self.endpoint.to_string(),
            });
        }
        write_message(&mut self.writer, message).map_err(|error| self.codec_error(error))?;
        self.awaiting_reply = true;
        Ok(())
    }

    /// Reads the reply to the last request.
    ///
    /// After a [`TransportError::Timeout`] the reply is still considered
    /// pending; callers either retry the receive or drop the producer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoRequestPending`] when nothing was sent,
    /// [`TransportError::Disconnected`] when the peer closed the connection,
    /// or another transport error if reading fails.
    pub fn recv(&mut self) -> Result<Message, TransportError> {
        if !self.awaiting_reply {
            return Err(TransportError::NoRequestPending {
                endpoint: self.endpoint.to_string(),
            });
        }
        let reply = read_message(&mut self.reader).map_err(|error| self.codec_error(error))?;
        self.awaiting_reply = false;
        reply.ok_or_else(|| TransportError::Disconnected {
            endpoint: self.endpoint.to_string(),
        })
    }

    /// Sends `message` and waits for its reply.
    ///
    /// # Errors
    ///
    /// See [`Self::send`] and [`Self::recv`].
    pub fn request(&mut self, message: &Message) -> Result<Message, TransportError> {
        self.send(message)?;
        self.recv()
    }

    /// Closes the connection.
    pub fn close(self) {
        if let Err(error) = self.writer.shutdown() {
            debug!(
                target: TRANSPORT_TARGET,
                endpoint = %self.endpoint,
                error = %error,
                "producer already closed"
            );
        }
    }

    fn codec_error(&self, error: CodecError) -> TransportError {
        let endpoint = self.endpoint.to_string();
        match error {
            CodecError::Io(source) if is_timeout(&source) => TransportError::Timeout { endpoint },
            CodecError::Io(source) if is_disconnect(&source) => {
                TransportError::Disconnected { endpoint }
            }
            source => TransportError::Codec { endpoint, source },
        }
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

fn open(endpoint: &SocketEndpoint) -> Result<Connection, TransportError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address =
                resolve_tcp_address(host, *port).map_err(|source| TransportError::Resolve {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            TcpStream::connect_timeout(&address, CONNECTION_TIMEOUT)
                .map(Connection::Tcp)
                .map_err(|source| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str()).map_err(|source| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }

            #[cfg(not(unix))]
            {
                let _ = path;
                Err(TransportError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                })
            }
        }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, CONNECTION_TIMEOUT)?;
    let stream: UnixStream = socket.into();
    Ok(Connection::Unix(stream))
}
