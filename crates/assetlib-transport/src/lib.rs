//! Channel pairs carrying protocol messages between processes.
//!
//! A [`Consumer`] binds an endpoint and answers every request it receives
//! through a [`MessageHandler`], one connection per thread. A [`Producer`]
//! connects to a consumer and performs strictly alternating send/receive
//! exchanges. A server pairs a consumer for inbound requests with one
//! producer per client for pushing results back, which gives the duplex
//! wiring; a single producer/consumer pair gives plain request/reply.

mod consumer;
mod errors;
mod handler;
mod listener;
mod producer;
mod stream;

pub use consumer::{Consumer, ConsumerHandle, create_consumer};
pub use errors::{ListenerError, TransportError};
pub use handler::{ConnectionHandler, MessageHandler};
pub use listener::{ListenerHandle, SocketListener};
pub use producer::{CONNECTION_TIMEOUT, Producer, create_producer};
pub use stream::Connection;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
