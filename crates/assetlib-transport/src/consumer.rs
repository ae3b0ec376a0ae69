//! Listening half of a channel pair.

use std::sync::Arc;

use assetlib_config::SocketEndpoint;

use crate::handler::MessageService;
use crate::{ListenerError, ListenerHandle, MessageHandler, SocketListener};

/// A bound endpoint waiting for a [`MessageHandler`].
///
/// Binding and starting are separate so callers can learn the concrete
/// endpoint (for example an ephemeral port) before any request arrives.
#[derive(Debug)]
pub struct Consumer {
    listener: SocketListener,
}

impl Consumer {
    /// Binds `endpoint`.
    ///
    /// # Errors
    ///
    /// See [`SocketListener::bind`].
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        SocketListener::bind(endpoint).map(|listener| Self { listener })
    }

    /// The endpoint actually bound.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        self.listener.endpoint()
    }

    /// Starts answering requests with `handler`.
    ///
    /// # Errors
    ///
    /// See [`SocketListener::start`].
    pub fn start<H: MessageHandler>(self, handler: H) -> Result<ConsumerHandle, ListenerError> {
        let listener = self
            .listener
            .start(Arc::new(MessageService::new(handler)))?;
        Ok(ConsumerHandle { listener })
    }
}

/// Binds `endpoint` and starts answering requests with `handler`.
///
/// # Errors
///
/// Returns [`ListenerError`] when binding or starting fails.
pub fn create_consumer<H: MessageHandler>(
    endpoint: &SocketEndpoint,
    handler: H,
) -> Result<ConsumerHandle, ListenerError> {
    Consumer::bind(endpoint)?.start(handler)
}

/// A running consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    listener: ListenerHandle,
}

impl ConsumerHandle {
    /// The endpoint being served.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        self.listener.endpoint()
    }

    /// Stops accepting, closes open connections and removes Unix socket
    /// files.
    pub fn shutdown(&self) {
        self.listener.shutdown();
    }

    /// Waits for the accept thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if it panicked.
    pub fn join(self) -> Result<(), ListenerError> {
        self.listener.join()
    }
}
