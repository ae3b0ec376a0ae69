//! Client side of the command protocol.
//!
//! An [`Invoker`] binds its own inbound endpoint, registers that endpoint
//! with the server's control channel, then submits commands on the command
//! channel. Submissions are acknowledged synchronously once queued; the
//! results arrive later on the inbound endpoint and surface as
//! [`Notification`]s.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use assetlib_config::{Config, SocketEndpoint};
use assetlib_protocol::{BLOCKING_KEY, Command, KeywordArguments, Message, Notification};
use assetlib_transport::{ConsumerHandle, ListenerError, TransportError, create_consumer, create_producer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::CLI_TARGET;
use crate::listener::ResultListener;

/// Notifications buffered before new ones are dropped.
pub const NOTIFICATION_CAPACITY: usize = 64;

/// Where an invoker connects and how long it waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerSettings {
    /// Server control endpoint.
    pub control: SocketEndpoint,
    /// Server command endpoint.
    pub command: SocketEndpoint,
    /// Endpoint bound locally for results.
    pub inbound: SocketEndpoint,
    /// Endpoint the server should dial; the bound inbound endpoint when unset.
    pub advertise: Option<SocketEndpoint>,
    /// Bound on every request except the acknowledgement of a blocking
    /// submission, which waits for the server queue to drain; `None` waits
    /// forever.
    pub timeout: Option<Duration>,
}

impl InvokerSettings {
    /// Extracts client settings from a resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            control: config.control_socket().clone(),
            command: config.command_socket().clone(),
            inbound: config.client_socket().clone(),
            advertise: config.client_advertise.clone(),
            timeout: config.request_timeout(),
        }
    }
}

/// Lifecycle of an [`Invoker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokerState {
    /// Not registered with a server.
    Disconnected,
    /// Binding the inbound endpoint and registering.
    Connecting,
    /// Registered and idle.
    Registered,
    /// Waiting for a submission to be acknowledged.
    Executing,
    /// Closed for good.
    Closed,
}

/// Errors surfaced by an [`Invoker`].
#[derive(Debug, Error)]
pub enum InvokerError {
    /// A command was submitted before `connect` succeeded.
    #[error("not registered with the server; connect first")]
    NotRegistered,
    /// The invoker has been closed.
    #[error("invoker is closed")]
    Closed,
    /// The inbound endpoint could not be bound.
    #[error("failed to bind result endpoint {endpoint}: {source}")]
    Bind {
        /// Endpoint that failed to bind.
        endpoint: SocketEndpoint,
        /// Listener failure.
        #[source]
        source: ListenerError,
    },
    /// Talking to the server failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered with `fail`.
    #[error("server rejected {request}: {reason}")]
    Rejected {
        /// What was asked.
        request: String,
        /// Failure text from the reply.
        reason: String,
    },
    /// The server answered with something other than what was asked for.
    #[error("unexpected reply to {request}")]
    UnexpectedReply {
        /// What was asked.
        request: &'static str,
    },
}

/// Client for the command server.
pub struct Invoker {
    settings: InvokerSettings,
    state: InvokerState,
    inbound: Option<ConsumerHandle>,
    identity: Option<String>,
    notifications: Option<mpsc::Receiver<Notification>>,
}

impl Invoker {
    /// Creates a disconnected invoker.
    #[must_use]
    pub const fn new(settings: InvokerSettings) -> Self {
        Self {
            settings,
            state: InvokerState::Disconnected,
            inbound: None,
            identity: None,
            notifications: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> InvokerState {
        self.state
    }

    /// Endpoint this invoker registered under, once connected.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Binds the inbound endpoint and registers it with the server.
    ///
    /// Connecting an already registered invoker does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`InvokerError`] when binding fails, the server cannot be
    /// reached, or the server rejects the registration. The invoker is left
    /// disconnected in every case.
    pub fn connect(&mut self) -> Result<(), InvokerError> {
        match self.state {
            InvokerState::Closed => return Err(InvokerError::Closed),
            InvokerState::Registered | InvokerState::Executing => return Ok(()),
            InvokerState::Disconnected | InvokerState::Connecting => {}
        }
        self.state = InvokerState::Connecting;

        let (sender, receiver) = mpsc::sync_channel(NOTIFICATION_CAPACITY);
        let inbound = match create_consumer(&self.settings.inbound, ResultListener::new(sender)) {
            Ok(handle) => handle,
            Err(source) => {
                self.state = InvokerState::Disconnected;
                return Err(InvokerError::Bind {
                    endpoint: self.settings.inbound.clone(),
                    source,
                });
            }
        };
        let identity = self
            .settings
            .advertise
            .as_ref()
            .unwrap_or_else(|| inbound.endpoint())
            .to_string();

        let registration = Message::request("connect")
            .with_args(vec![Value::String(identity.clone())])
            .with_id(identity.clone());
        if let Err(error) = self.control_request("connect", &registration) {
            inbound.shutdown();
            self.state = InvokerState::Disconnected;
            warn!(
                target: CLI_TARGET,
                endpoint = %identity,
                error = %error,
                "registration failed"
            );
            return Err(error);
        }

        debug!(
            target: CLI_TARGET,
            endpoint = %identity,
            control = %self.settings.control,
            "registered with server"
        );
        self.inbound = Some(inbound);
        self.identity = Some(identity);
        self.notifications = Some(receiver);
        self.state = InvokerState::Registered;
        Ok(())
    }

    /// Submits `command` under this invoker's identity.
    ///
    /// The returned reply is the server's acknowledgement: `queued` for
    /// ordinary commands, `completed` once the queue has drained for
    /// blocking ones. Results arrive later as notifications. Blocking
    /// submissions wait for their acknowledgement without a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`InvokerError`] when not registered, on transport failure, or
    /// when the server rejects the submission.
    pub fn execute(&mut self, command: Command) -> Result<Message, InvokerError> {
        let label = command.to_string();
        let identity = self.registered_identity()?;
        let request = command.with_id(identity).to_message();
        self.submit_message(&label, &request)
    }

    /// Submits a command by raw name, for input that may name commands this
    /// client does not know about.
    ///
    /// # Errors
    ///
    /// See [`Invoker::execute`].
    pub fn submit(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: KeywordArguments,
    ) -> Result<Message, InvokerError> {
        let identity = self.registered_identity()?;
        let request = Message::request(name)
            .with_args(args)
            .with_kwargs(kwargs)
            .with_id(identity);
        self.submit_message(name, &request)
    }

    /// Imports `path` into the host.
    ///
    /// # Errors
    ///
    /// See [`Invoker::execute`].
    pub fn import(&mut self, path: impl Into<String>) -> Result<Message, InvokerError> {
        self.execute(Command::import(path))
    }

    /// Brings `path` into the host as a reference.
    ///
    /// # Errors
    ///
    /// See [`Invoker::execute`].
    pub fn reference(&mut self, path: impl Into<String>) -> Result<Message, InvokerError> {
        self.execute(Command::reference(path))
    }

    /// Clients currently registered with the server.
    ///
    /// # Errors
    ///
    /// Returns [`InvokerError`] when closed, on transport failure, or when the
    /// reply is not a list of endpoints.
    pub fn clients(&self) -> Result<Vec<String>, InvokerError> {
        if self.state == InvokerState::Closed {
            return Err(InvokerError::Closed);
        }
        let reply = self.control_request("clients", &Message::request("clients"))?;
        let Some(Value::Array(entries)) = reply.result else {
            return Err(InvokerError::UnexpectedReply { request: "clients" });
        };
        entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(endpoint) => Ok(endpoint),
                _ => Err(InvokerError::UnexpectedReply { request: "clients" }),
            })
            .collect()
    }

    /// Waits for the next notification. `None` waits forever.
    ///
    /// Returns `None` when nothing arrived in time or the invoker is not
    /// connected.
    #[must_use]
    pub fn wait_for_notification(&self, timeout: Option<Duration>) -> Option<Notification> {
        let notifications = self.notifications.as_ref()?;
        match timeout {
            Some(limit) => match notifications.recv_timeout(limit) {
                Ok(notification) => Some(notification),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
            },
            None => notifications.recv().ok(),
        }
    }

    /// Notifications that have already arrived, oldest first.
    #[must_use]
    pub fn pending_notifications(&self) -> Vec<Notification> {
        self.notifications
            .as_ref()
            .map(|notifications| notifications.try_iter().collect())
            .unwrap_or_default()
    }

    /// Stops the inbound listener. Every later call fails with
    /// [`InvokerError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`InvokerError::Bind`] if the listener thread failed.
    pub fn close(&mut self) -> Result<(), InvokerError> {
        self.state = InvokerState::Closed;
        self.notifications = None;
        let Some(inbound) = self.inbound.take() else {
            return Ok(());
        };
        let endpoint = inbound.endpoint().clone();
        inbound.shutdown();
        inbound
            .join()
            .map_err(|source| InvokerError::Bind { endpoint, source })?;
        debug!(target: CLI_TARGET, "invoker closed");
        Ok(())
    }

    fn registered_identity(&self) -> Result<String, InvokerError> {
        match (self.state, &self.identity) {
            (InvokerState::Closed, _) => Err(InvokerError::Closed),
            (InvokerState::Registered, Some(identity)) => Ok(identity.clone()),
            _ => Err(InvokerError::NotRegistered),
        }
    }

    fn submit_message(&mut self, label: &str, request: &Message) -> Result<Message, InvokerError> {
        let timeout = if request.kwargs.get(BLOCKING_KEY) == Some(&Value::Bool(true)) {
            None
        } else {
            self.settings.timeout
        };
        self.state = InvokerState::Executing;
        let outcome = create_producer(&self.settings.command, timeout)
            .and_then(|mut producer| {
                let reply = producer.request(request);
                producer.close();
                reply
            })
            .map_err(InvokerError::from);
        self.state = InvokerState::Registered;

        let reply = outcome?;
        if reply.is_ok() {
            debug!(
                target: CLI_TARGET,
                command = label,
                info = reply.info.as_deref(),
                "submission acknowledged"
            );
            Ok(reply)
        } else {
            let reason = reply.failure_text();
            warn!(
                target: CLI_TARGET,
                command = label,
                reason = %reason,
                "submission rejected"
            );
            Err(InvokerError::Rejected {
                request: label.to_owned(),
                reason,
            })
        }
    }

    fn control_request(&self, label: &str, request: &Message) -> Result<Message, InvokerError> {
        let mut producer = create_producer(&self.settings.control, self.settings.timeout)?;
        let outcome = producer.request(request);
        producer.close();
        let reply = outcome?;
        if reply.is_ok() {
            Ok(reply)
        } else {
            Err(InvokerError::Rejected {
                request: label.to_owned(),
                reason: reply.failure_text(),
            })
        }
    }
}

impl Drop for Invoker {
    fn drop(&mut self) {
        if let Some(inbound) = self.inbound.take() {
            inbound.shutdown();
        }
    }
}
