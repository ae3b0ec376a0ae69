//! Background accept loop for TCP and Unix domain endpoints.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use assetlib_config::SocketEndpoint;
use tracing::{debug, info, warn};

use crate::{Connection, ConnectionHandler, ListenerError, TRANSPORT_TARGET};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to a socket endpoint but not yet accepting.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds `endpoint`.
    ///
    /// TCP port `0` binds an ephemeral port; [`Self::endpoint`] reports the
    /// port actually chosen. For Unix endpoints the parent directory is
    /// created, a stale socket file is removed, and a live one is refused.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when resolution, preparation or binding
    /// fails.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = bind_tcp(host, *port)?;
                let bound = listener
                    .local_addr()
                    .map_err(|source| ListenerError::LocalAddress {
                        endpoint: endpoint.to_string(),
                        source,
                    })?;
                Ok(Self {
                    endpoint: endpoint.with_port(bound.port()),
                    listener: ListenerKind::Tcp(listener),
                })
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    endpoint.prepare_filesystem()?;
                    let listener = bind_unix(path.as_std_path())?;
                    Ok(Self {
                        endpoint: endpoint.clone(),
                        listener: ListenerKind::Unix(listener),
                    })
                }

                #[cfg(not(unix))]
                {
                    let _ = path;
                    Err(ListenerError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    })
                }
            }
        }
    }

    /// The endpoint actually bound.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Starts accepting on a background thread.
    ///
    /// Each accepted connection is handed to `handler` on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NonBlocking`] if the socket cannot be
    /// switched to non-blocking mode.
    pub fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(error) = match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        } {
            #[cfg(unix)]
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking { source: error });
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(ConnectionTracker::default());
        let endpoint = self.endpoint.clone();
        let accept = AcceptLoop {
            listener: self,
            shutdown: Arc::clone(&shutdown),
            connections: Arc::clone(&connections),
            handler,
        };
        let handle = thread::spawn(move || accept.run());
        Ok(ListenerHandle {
            endpoint,
            shutdown,
            connections,
            handle: Some(handle),
        })
    }
}

/// Handle to a running accept loop.
///
/// Dropping the handle stops accepting but does not wait for the thread.
#[derive(Debug)]
pub struct ListenerHandle {
    endpoint: SocketEndpoint,
    shutdown: Arc<AtomicBool>,
    connections: Arc<ConnectionTracker>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// The endpoint being served.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Number of connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Stops accepting and closes every open connection.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.connections.close_all();
    }

    /// Waits for the accept thread to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Open connections, kept so shutdown can wake their blocked readers.
#[derive(Debug, Default)]
struct ConnectionTracker {
    next_id: AtomicU64,
    closed: AtomicBool,
    open: Mutex<HashMap<u64, Connection>>,
}

impl ConnectionTracker {
    fn track(self: &Arc<Self>, stream: &Connection) -> TrackedConnection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match stream.try_clone() {
            Ok(clone) => {
                self.lock().insert(id, clone);
            }
            Err(error) => debug!(
                target: TRANSPORT_TARGET,
                error = %error,
                "connection will not be closed on shutdown"
            ),
        }
        if self.closed.load(Ordering::SeqCst) {
            close_quietly(stream);
        }
        TrackedConnection {
            id,
            tracker: Arc::clone(self),
        }
    }

    fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for connection in self.lock().values() {
            close_quietly(connection);
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Connection>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct TrackedConnection {
    id: u64,
    tracker: Arc<ConnectionTracker>,
}

impl Drop for TrackedConnection {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.id);
    }
}

fn close_quietly(connection: &Connection) {
    if let Err(error) = connection.shutdown()
        && error.kind() != io::ErrorKind::NotConnected
    {
        debug!(
            target: TRANSPORT_TARGET,
            error = %error,
            "failed to shut down connection"
        );
    }
}

struct AcceptLoop {
    listener: SocketListener,
    shutdown: Arc<AtomicBool>,
    connections: Arc<ConnectionTracker>,
    handler: Arc<dyn ConnectionHandler>,
}

impl AcceptLoop {
    fn run(self) {
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %self.listener.endpoint,
            "socket listener active"
        );
        let mut last_error = None::<io::ErrorKind>;
        while !self.shutdown.load(Ordering::SeqCst) {
            match accept_connection(&self.listener) {
                Ok(Some(stream)) => {
                    last_error = None;
                    let tracked = self.connections.track(&stream);
                    let handler = Arc::clone(&self.handler);
                    thread::spawn(move || {
                        let _tracked = tracked;
                        handler.handle(stream);
                    });
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: TRANSPORT_TARGET,
                            endpoint = %self.listener.endpoint,
                            error = %error,
                            "socket accept error"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        self.connections.close_all();
        #[cfg(unix)]
        cleanup_unix_socket(&self.listener.endpoint);
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %self.listener.endpoint,
            "socket listener stopped"
        );
    }
}

fn accept_connection(listener: &SocketListener) -> io::Result<Option<Connection>> {
    let accepted = match &listener.listener {
        ListenerKind::Tcp(tcp) => tcp.accept().map(|(stream, _)| Connection::Tcp(stream)),
        #[cfg(unix)]
        ListenerKind::Unix(unix) => unix.accept().map(|(stream, _)| Connection::Unix(stream)),
    };
    match accepted {
        Ok(stream) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        remove_stale_socket(path)?;
    }
    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let display = || path.display().to_string();
    let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
        path: display(),
        source,
    })?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket { path: display() });
    }
    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::UnixInUse { path: display() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: display(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: display(),
            source,
        }),
    }
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
