//! Wires listeners, queue and worker into a running server.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use assetlib_config::{Config, SocketEndpoint};
use assetlib_protocol::{CommandRegistry, Receiver};
use assetlib_transport::{Consumer, ConsumerHandle, ListenerError};
use thiserror::Error;
use tracing::info;

use crate::clients::ClientRegistry;
use crate::dispatch::{CommandHandler, ControlHandler};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::history::{History, HistoryEntry};
use crate::queue::{QueueClosed, WorkQueue};
use crate::worker::{Job, Worker};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Errors surfaced while starting or stopping a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A listener could not be bound or started.
    #[error("failed to start {role} listener: {source}")]
    Listener {
        /// Which endpoint failed (`control` or `command`).
        role: &'static str,
        /// Listener failure.
        #[source]
        source: ListenerError,
    },
    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// A server thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanic(&'static str),
}

/// Server definition: where to listen and what to run commands against.
pub struct Server {
    control_socket: SocketEndpoint,
    command_socket: SocketEndpoint,
    request_timeout: Option<Duration>,
    history_limit: usize,
    registry: CommandRegistry,
    receiver: Option<Arc<dyn Receiver>>,
    reporter: Arc<dyn HealthReporter>,
}

impl Server {
    /// Describes a server using the endpoints and limits from `config`, the
    /// standard command registry, and structured health reporting.
    #[must_use]
    pub fn new(config: &Config, receiver: Arc<dyn Receiver>) -> Self {
        Self {
            receiver: Some(receiver),
            ..Self::detached(config)
        }
    }

    /// Describes a server with no receiver attached. Commands that need one
    /// fail with `Command has no receiver`; `time` and `sleep` still run.
    #[must_use]
    pub fn detached(config: &Config) -> Self {
        Self {
            control_socket: config.control_socket().clone(),
            command_socket: config.command_socket().clone(),
            request_timeout: config.request_timeout(),
            history_limit: config.history_limit(),
            registry: CommandRegistry::standard(),
            receiver: None,
            reporter: Arc::new(StructuredHealthReporter::new()),
        }
    }

    /// Replaces the command registry.
    #[must_use]
    pub fn with_registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the health reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Binds both endpoints and starts the listeners and the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if an endpoint cannot be bound or a thread
    /// cannot be spawned. Nothing is left running on failure.
    pub fn start(self) -> Result<ServerHandle, ServerError> {
        let control_consumer = Consumer::bind(&self.control_socket).map_err(|source| {
            ServerError::Listener {
                role: "control",
                source,
            }
        })?;
        let command_consumer = Consumer::bind(&self.command_socket).map_err(|source| {
            ServerError::Listener {
                role: "command",
                source,
            }
        })?;

        let queue = Arc::new(WorkQueue::new());
        let clients = Arc::new(ClientRegistry::new(self.request_timeout));
        let history = Arc::new(History::new(self.history_limit));

        let runner = Worker::new(Arc::clone(&queue), Arc::clone(&history));
        let worker = thread::Builder::new()
            .name("assetlibd-worker".to_owned())
            .spawn(move || runner.run())
            .map_err(ServerError::Spawn)?;

        let started = start_listeners(
            &self,
            control_consumer,
            command_consumer,
            Shared {
                queue: Arc::clone(&queue),
                clients: Arc::clone(&clients),
                history: Arc::clone(&history),
            },
        );
        let (control, command) = match started {
            Ok(listeners) => listeners,
            Err(error) => {
                queue.close();
                if worker.join().is_err() {
                    return Err(ServerError::ThreadPanic("worker"));
                }
                return Err(error);
            }
        };

        self.reporter
            .server_listening(control.endpoint(), command.endpoint());
        Ok(ServerHandle {
            control_endpoint: control.endpoint().clone(),
            command_endpoint: command.endpoint().clone(),
            threads: Some(Threads {
                control,
                command,
                worker,
            }),
            queue,
            clients,
            history,
            reporter: self.reporter,
        })
    }
}

struct Shared {
    queue: Arc<WorkQueue<Job>>,
    clients: Arc<ClientRegistry>,
    history: Arc<History>,
}

fn start_listeners(
    server: &Server,
    control: Consumer,
    command: Consumer,
    shared: Shared,
) -> Result<(ConsumerHandle, ConsumerHandle), ServerError> {
    let Shared {
        queue,
        clients,
        history,
    } = shared;
    let command_handler = CommandHandler::new(
        server.registry.clone(),
        server.receiver.clone(),
        Arc::clone(&clients),
        queue,
    );
    let command_handle = command
        .start(command_handler)
        .map_err(|source| ServerError::Listener {
            role: "command",
            source,
        })?;
    let control_handler = ControlHandler::new(clients, history, Arc::clone(&server.reporter));
    match control.start(control_handler) {
        Ok(control_handle) => Ok((control_handle, command_handle)),
        Err(source) => {
            command_handle.shutdown();
            Err(ServerError::Listener {
                role: "control",
                source,
            })
        }
    }
}

struct Threads {
    control: ConsumerHandle,
    command: ConsumerHandle,
    worker: JoinHandle<()>,
}

/// A running server.
///
/// Dropping the handle stops the listeners and the worker without waiting
/// for them; call [`ServerHandle::shutdown`] and [`ServerHandle::join`] for
/// an orderly stop.
pub struct ServerHandle {
    control_endpoint: SocketEndpoint,
    command_endpoint: SocketEndpoint,
    threads: Option<Threads>,
    queue: Arc<WorkQueue<Job>>,
    clients: Arc<ClientRegistry>,
    history: Arc<History>,
    reporter: Arc<dyn HealthReporter>,
}

impl ServerHandle {
    /// Bound control endpoint.
    #[must_use]
    pub const fn control_endpoint(&self) -> &SocketEndpoint {
        &self.control_endpoint
    }

    /// Bound command endpoint.
    #[must_use]
    pub const fn command_endpoint(&self) -> &SocketEndpoint {
        &self.command_endpoint
    }

    /// Commands waiting to be executed.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Commands queued or executing.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.unfinished()
    }

    /// Registered client endpoints, sorted.
    #[must_use]
    pub fn clients(&self) -> Vec<String> {
        self.clients.ids()
    }

    /// Recently executed commands, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.snapshot()
    }

    /// Blocks until every queued command has run and been confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the server shuts down first.
    pub fn drain(&self) -> Result<(), QueueClosed> {
        self.queue.join()
    }

    /// Stops accepting requests and abandons queued work. The worker
    /// finishes the command it is running, if any.
    pub fn shutdown(&self) {
        self.reporter.shutdown_started();
        self.stop();
    }

    fn stop(&self) {
        if let Some(threads) = &self.threads {
            threads.control.shutdown();
            threads.command.shutdown();
        }
        self.queue.close();
    }

    /// Waits for every server thread to stop.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if a thread panicked.
    pub fn join(mut self) -> Result<(), ServerError> {
        let Some(Threads {
            control,
            command,
            worker,
        }) = self.threads.take()
        else {
            return Ok(());
        };
        control.join().map_err(|source| ServerError::Listener {
            role: "control",
            source,
        })?;
        command.join().map_err(|source| ServerError::Listener {
            role: "command",
            source,
        })?;
        if worker.join().is_err() {
            return Err(ServerError::ThreadPanic("worker"));
        }
        info!(target: SERVER_TARGET, "server threads stopped");
        self.reporter.shutdown_completed();
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::LoggingReceiver;

    fn loopback() -> Config {
        Config {
            control_socket: SocketEndpoint::tcp("127.0.0.1", 0),
            command_socket: SocketEndpoint::tcp("127.0.0.1", 0),
            ..Config::default()
        }
    }

    #[test]
    fn dropping_the_handle_stops_every_thread() {
        let handle = Server::new(&loopback(), Arc::new(LoggingReceiver))
            .start()
            .expect("start server");
        let queue = Arc::clone(&handle.queue);

        drop(handle);

        assert!(matches!(queue.join(), Err(QueueClosed)));
        let deadline = Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&queue) > 1 {
            assert!(Instant::now() < deadline, "server threads still hold the queue");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn drain_returns_once_the_queue_is_idle() {
        let handle = Server::detached(&loopback()).start().expect("start server");
        assert!(handle.drain().is_ok());
        handle.shutdown();
        assert!(handle.drain().is_err());
        handle.join().expect("join server");
    }
}
