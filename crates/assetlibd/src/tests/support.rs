//! Test harness utilities for the dispatch server suites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use assetlib_config::{Config, SocketEndpoint};
use assetlib_protocol::{Message, Receiver, ReceiverError, Status};
use assetlib_transport::{ConsumerHandle, MessageHandler, create_consumer, create_producer};
use serde_json::{Value, json};

use crate::server::{Server, ServerHandle};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

mockall::mock! {
    pub ReceiverHost {}

    impl Receiver for ReceiverHost {
        fn register(&self, endpoint: &str) -> Result<Value, ReceiverError>;
        fn import_file(&self, path: &str) -> Result<Value, ReceiverError>;
        fn import_reference(&self, path: &str) -> Result<Value, ReceiverError>;
    }
}

/// Receiver that records the order of calls and notices overlapping ones.
#[derive(Default)]
pub(crate) struct RecordingReceiver {
    calls: Mutex<Vec<String>>,
    busy: AtomicBool,
    overlapped: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingReceiver {
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn record(&self, call: String, value: Value) -> Result<Value, ReceiverError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        self.busy.store(false, Ordering::SeqCst);
        Ok(value)
    }
}

impl Receiver for RecordingReceiver {
    fn import_file(&self, path: &str) -> Result<Value, ReceiverError> {
        self.record(format!("import {path}"), json!({ "imported": path }))
    }

    fn import_reference(&self, path: &str) -> Result<Value, ReceiverError> {
        self.record(format!("reference {path}"), json!({ "referenced": path }))
    }
}

/// Starts a server on ephemeral loopback ports.
pub(crate) fn start_server(receiver: Option<Arc<dyn Receiver>>) -> ServerHandle {
    let config = Config {
        control_socket: SocketEndpoint::tcp("127.0.0.1", 0),
        command_socket: SocketEndpoint::tcp("127.0.0.1", 0),
        request_timeout_secs: 5,
        ..Config::default()
    };
    let server = match receiver {
        Some(receiver) => Server::new(&config, receiver),
        None => Server::detached(&config),
    };
    server.start().expect("start server")
}

#[derive(Default)]
struct Inbox {
    messages: Mutex<Vec<Message>>,
    arrived: Condvar,
}

struct InboxHandler {
    inbox: Arc<Inbox>,
}

impl MessageHandler for InboxHandler {
    fn handle(&self, request: Message) -> Message {
        let mut messages = self
            .inbox
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        messages.push(request);
        self.inbox.arrived.notify_all();
        Message::confirmation(Status::Ok)
    }
}

/// A client with its own inbound consumer recording every result pushed to
/// it.
pub(crate) struct TestClient {
    consumer: ConsumerHandle,
    inbox: Arc<Inbox>,
}

impl TestClient {
    pub(crate) fn bind() -> Self {
        let inbox = Arc::new(Inbox::default());
        let consumer = create_consumer(
            &SocketEndpoint::tcp("127.0.0.1", 0),
            InboxHandler {
                inbox: Arc::clone(&inbox),
            },
        )
        .expect("bind client consumer");
        Self { consumer, inbox }
    }

    pub(crate) fn id(&self) -> String {
        self.consumer.endpoint().to_string()
    }

    /// Registers this client on the server's control endpoint.
    pub(crate) fn connect(&self, server: &ServerHandle) -> Message {
        request(
            server.control_endpoint(),
            &Message::request("connect").with_args(vec![Value::String(self.id())]),
        )
    }

    /// Submits `message` on the command endpoint under this client's id.
    pub(crate) fn submit(&self, server: &ServerHandle, message: Message) -> Message {
        request(server.command_endpoint(), &message.with_id(self.id()))
    }

    /// Results received so far.
    pub(crate) fn received(&self) -> Vec<Message> {
        self.inbox
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits until at least `count` results have arrived.
    pub(crate) fn wait_for(&self, count: usize) -> Vec<Message> {
        let deadline = Instant::now() + REPLY_TIMEOUT;
        let mut messages = self
            .inbox
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while messages.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            assert!(
                !remaining.is_zero(),
                "expected {count} results, got {}",
                messages.len()
            );
            messages = self
                .inbox
                .arrived
                .wait_timeout(messages, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        messages.clone()
    }
}

impl Drop for TestClient {
    fn drop(&mut self) {
        self.consumer.shutdown();
    }
}

/// Sends one request and waits for its reply.
pub(crate) fn request(endpoint: &SocketEndpoint, message: &Message) -> Message {
    let mut producer = create_producer(endpoint, Some(REPLY_TIMEOUT)).expect("connect producer");
    let reply = producer.request(message).expect("request");
    producer.close();
    reply
}

/// Builds a command request from its name and positional arguments.
pub(crate) fn command(name: &str, args: &[&str]) -> Message {
    Message::request(name).with_args(args.iter().map(|arg| json!(arg)).collect())
}
