//! Connection handling abstractions.

use std::io::BufReader;

use assetlib_protocol::{CodecError, Message, read_message, write_message};
use tracing::{debug, warn};

use crate::{Connection, TRANSPORT_TARGET};

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: Connection);
}

/// Answers requests arriving on a consumer.
///
/// Every request gets exactly one reply, written before the next request on
/// the same connection is read.
pub trait MessageHandler: Send + Sync + 'static {
    /// Produces the reply to `request`.
    fn handle(&self, request: Message) -> Message;

    /// Observes a request that could not be decoded. A `fail` reply is sent
    /// regardless.
    fn rejected(&self, _error: &CodecError) {}
}

/// Adapts a [`MessageHandler`] to the per-connection request loop.
pub(crate) struct MessageService<H> {
    handler: H,
}

impl<H> MessageService<H> {
    pub(crate) const fn new(handler: H) -> Self {
        Self { handler }
    }
}

impl<H: MessageHandler> ConnectionHandler for MessageService<H> {
    fn handle(&self, stream: Connection) {
        let mut writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "failed to split connection"
                );
                return;
            }
        };
        let mut reader = BufReader::new(stream);
        loop {
            let (reply, keep_open) = match read_message(&mut reader) {
                Ok(Some(request)) => (self.handler.handle(request), true),
                Ok(None) => break,
                Err(error) if matches!(error, CodecError::Io(_)) => {
                    debug!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "connection closed"
                    );
                    break;
                }
                Err(error) => {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "rejected undecodable request"
                    );
                    self.handler.rejected(&error);
                    (Message::fail(error.to_string()), error.is_recoverable())
                }
            };
            if let Err(error) = write_message(&mut writer, &reply) {
                debug!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "failed to write reply"
                );
                break;
            }
            if !keep_open {
                break;
            }
        }
        if let Err(error) = writer.shutdown() {
            debug!(
                target: TRANSPORT_TARGET,
                error = %error,
                "connection already closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Mutex;
    use std::thread;

    use assetlib_protocol::{MAX_MESSAGE_BYTES, Status};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct EchoHandler {
        rejected: Mutex<Vec<String>>,
    }

    impl MessageHandler for EchoHandler {
        fn handle(&self, request: Message) -> Message {
            Message::ok().with_result(json!(request.command))
        }

        fn rejected(&self, error: &CodecError) {
            if let Ok(mut rejected) = self.rejected.lock() {
                rejected.push(error.to_string());
            }
        }
    }

    fn serve_once() -> (TcpStream, thread::JoinHandle<()>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept connection");
            MessageService::new(EchoHandler::default()).handle(Connection::Tcp(stream));
        });
        (TcpStream::connect(addr).expect("connect client"), server)
    }

    fn read_reply(reader: &mut impl BufRead) -> Message {
        read_message(reader)
            .expect("read reply")
            .expect("reply present")
    }

    #[test]
    fn malformed_request_gets_fail_and_connection_survives() {
        let (mut client, server) = serve_once();
        let mut reader = BufReader::new(client.try_clone().expect("clone client"));

        client.write_all(b"not json\n").expect("write garbage");
        let failure = read_reply(&mut reader);
        assert_eq!(failure.status, Some(Status::Fail));
        assert!(failure.info.is_some_and(|info| info.contains("malformed")));

        write_message(&mut client, &Message::request("time")).expect("write request");
        let reply = read_reply(&mut reader);
        assert_eq!(reply.result, Some(json!("time")));

        drop(client);
        drop(reader);
        server.join().expect("join server");
    }

    #[test]
    fn oversized_request_closes_connection() {
        let (mut client, server) = serve_once();
        let mut reader = BufReader::new(client.try_clone().expect("clone client"));

        let payload = vec![b'x'; MAX_MESSAGE_BYTES.saturating_add(1)];
        client.write_all(&payload).expect("write payload");

        let failure = read_reply(&mut reader);
        assert!(failure.info.is_some_and(|info| info.contains("too large")));
        assert!(read_message(&mut reader).expect("read after close").is_none());
        server.join().expect("join server");
    }
}
