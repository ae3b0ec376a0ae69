//! Command endpoint: validates submissions and enqueues them.

use std::sync::Arc;

use assetlib_protocol::{CommandRegistry, Message, Receiver};
use assetlib_transport::MessageHandler;
use tracing::{debug, warn};

use super::{DISPATCH_TARGET, not_registered};
use crate::clients::ClientRegistry;
use crate::queue::WorkQueue;
use crate::worker::Job;

/// Resolves submissions into bound commands and queues them.
///
/// Non-blocking submissions are acknowledged as soon as they are queued.
/// Blocking ones are acknowledged only after the queue has drained.
pub(crate) struct CommandHandler {
    registry: CommandRegistry,
    receiver: Option<Arc<dyn Receiver>>,
    clients: Arc<ClientRegistry>,
    queue: Arc<WorkQueue<Job>>,
}

impl CommandHandler {
    pub(crate) fn new(
        registry: CommandRegistry,
        receiver: Option<Arc<dyn Receiver>>,
        clients: Arc<ClientRegistry>,
        queue: Arc<WorkQueue<Job>>,
    ) -> Self {
        Self {
            registry,
            receiver,
            clients,
            queue,
        }
    }
}

impl MessageHandler for CommandHandler {
    fn handle(&self, request: Message) -> Message {
        let command = match self.registry.parse(&request) {
            Ok(command) => command,
            Err(error) => {
                debug!(
                    target: DISPATCH_TARGET,
                    command = request.command.as_deref(),
                    kind = error.kind(),
                    error = %error,
                    "submission rejected"
                );
                return Message::fail(error.to_string());
            }
        };
        let Some(client) = command.id().and_then(|id| self.clients.get(id)) else {
            return Message::fail(not_registered(command.id()));
        };

        let blocking = command.is_blocking();
        let command = match &self.receiver {
            Some(receiver) => command.bind(Arc::clone(receiver)),
            None => command.unbound(),
        };
        let job = Job { command, client };
        if self.queue.put(job).is_err() {
            return Message::fail("server is shutting down");
        }
        debug!(
            target: DISPATCH_TARGET,
            blocking,
            queued = self.queue.len(),
            "command queued"
        );
        if !blocking {
            return Message::ok().with_info("queued");
        }
        match self.queue.join() {
            Ok(()) => Message::ok().with_info("completed"),
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    error = %error,
                    "blocking submission interrupted"
                );
                Message::fail(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::LoggingReceiver;

    fn handler() -> (CommandHandler, Arc<WorkQueue<Job>>) {
        let queue = Arc::new(WorkQueue::new());
        let handler = CommandHandler::new(
            CommandRegistry::standard(),
            Some(Arc::new(LoggingReceiver)),
            Arc::new(ClientRegistry::new(None)),
            Arc::clone(&queue),
        );
        (handler, queue)
    }

    #[test]
    fn unknown_command_is_not_queued() {
        let (handler, queue) = handler();
        let reply = handler.handle(Message::request("frobnicate").with_id("tcp://127.0.0.1:6002"));
        assert!(!reply.is_ok());
        assert_eq!(reply.info.as_deref(), Some("'frobnicate' not available"));
        assert_eq!(queue.unfinished(), 0);
    }

    #[test]
    fn unregistered_client_is_told_to_reconnect() {
        let (handler, queue) = handler();
        let reply = handler.handle(
            Message::request("import")
                .with_args(vec![json!("/a.obj")])
                .with_id("tcp://127.0.0.1:6002"),
        );
        assert_eq!(
            reply.info.as_deref(),
            Some("tcp://127.0.0.1:6002 not registered, try reconnecting..")
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn invalid_arguments_are_rejected_before_queueing() {
        let (handler, queue) = handler();
        let reply = handler.handle(Message::request("import").with_id("tcp://127.0.0.1:6002"));
        assert!(
            reply
                .info
                .is_some_and(|info| info.contains("missing required argument"))
        );
        assert!(queue.is_empty());
    }
}
