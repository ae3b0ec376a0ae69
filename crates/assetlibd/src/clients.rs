//! Registered clients and the channels results are pushed through.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use assetlib_config::{SocketEndpoint, SocketParseError};
use assetlib_protocol::Message;
use assetlib_transport::{Producer, TransportError};
use thiserror::Error;
use tracing::{debug, info, warn};

const CLIENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::clients");

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The endpoint was added.
    New,
    /// The endpoint was already registered; the first registration stands.
    Existing,
}

/// Reasons a client cannot be registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The endpoint string is not a valid address.
    #[error("invalid client endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        /// Endpoint as submitted.
        endpoint: String,
        /// Parse failure.
        #[source]
        source: SocketParseError,
    },
    /// The client's inbound endpoint did not accept a connection.
    #[error("client endpoint unreachable: {0}")]
    Unreachable(#[from] TransportError),
}

/// Outbound channel to one client's inbound endpoint.
#[derive(Debug)]
pub struct ClientChannel {
    id: String,
    endpoint: SocketEndpoint,
    timeout: Option<Duration>,
    producer: Mutex<Option<Producer>>,
}

impl ClientChannel {
    fn open(endpoint: SocketEndpoint, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let producer = Producer::connect(&endpoint, timeout)?;
        Ok(Self {
            id: endpoint.to_string(),
            endpoint,
            timeout,
            producer: Mutex::new(Some(producer)),
        })
    }

    /// Identifier the client registered under.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Pushes `message` to the client and waits for its confirmation.
    ///
    /// A failed exchange drops the connection; the next delivery dials the
    /// client again.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when connecting, sending or awaiting the
    /// confirmation fails.
    pub fn deliver(&self, message: &Message) -> Result<Message, TransportError> {
        let mut slot = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut producer = match slot.take() {
            Some(producer) => producer,
            None => {
                debug!(
                    target: CLIENTS_TARGET,
                    client = %self.id,
                    "reconnecting to client"
                );
                Producer::connect(&self.endpoint, self.timeout)?
            }
        };
        let confirmation = producer.request(message)?;
        *slot = Some(producer);
        Ok(confirmation)
    }
}

/// Table of registered clients keyed by their inbound endpoint.
///
/// Insert-if-absent is the only mutation, so repeated registrations are
/// harmless.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    timeout: Option<Duration>,
    clients: Mutex<BTreeMap<String, Arc<ClientChannel>>>,
}

impl ClientRegistry {
    /// An empty registry whose channels use `timeout` for every exchange.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            clients: Mutex::default(),
        }
    }

    /// Registers the client listening on `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when the endpoint is invalid or cannot
    /// be reached; nothing is registered in that case.
    pub fn register(&self, endpoint: &str) -> Result<Registration, RegistrationError> {
        let parsed: SocketEndpoint =
            endpoint
                .trim()
                .parse()
                .map_err(|source| RegistrationError::InvalidEndpoint {
                    endpoint: endpoint.to_owned(),
                    source,
                })?;
        let id = parsed.to_string();
        if self.lock().contains_key(&id) {
            return Ok(Self::existing(&id));
        }

        let channel = Arc::new(ClientChannel::open(parsed, self.timeout)?);
        let mut clients = self.lock();
        if clients.contains_key(&id) {
            drop(clients);
            return Ok(Self::existing(&id));
        }
        clients.insert(id.clone(), channel);
        drop(clients);
        info!(
            target: CLIENTS_TARGET,
            client = %id,
            "client registered"
        );
        Ok(Registration::New)
    }

    /// Channel of the client registered under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ClientChannel>> {
        self.lock().get(&normalise(id)).cloned()
    }

    /// Registered identifiers in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no client is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn existing(id: &str) -> Registration {
        warn!(
            target: CLIENTS_TARGET,
            client = %id,
            "client already registered"
        );
        Registration::Existing
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<ClientChannel>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalise(id: &str) -> String {
    id.trim()
        .parse::<SocketEndpoint>()
        .map_or_else(|_| id.trim().to_owned(), |endpoint| endpoint.to_string())
}
