//! Inbound listener turning pushed results into local notifications.

use std::sync::mpsc::{SyncSender, TrySendError};

use assetlib_protocol::{CodecError, Message, Notification, Status};
use assetlib_transport::MessageHandler;
use tracing::{debug, warn};

use crate::CLI_TARGET;

/// Forwards every result the server pushes to a bounded channel and confirms
/// it, so the server's worker can move on.
pub(crate) struct ResultListener {
    notifications: SyncSender<Notification>,
}

impl ResultListener {
    pub(crate) const fn new(notifications: SyncSender<Notification>) -> Self {
        Self { notifications }
    }

    fn push(&self, notification: Notification) {
        match self.notifications.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => warn!(
                target: CLI_TARGET,
                notification = %dropped,
                "notification queue full; dropping notification"
            ),
            Err(TrySendError::Disconnected(_)) => debug!(
                target: CLI_TARGET,
                "notification received after the invoker closed"
            ),
        }
    }
}

impl MessageHandler for ResultListener {
    fn handle(&self, request: Message) -> Message {
        self.push(Notification::from(request));
        Message::confirmation(Status::Ok)
    }

    fn rejected(&self, error: &CodecError) {
        self.push(Notification::Failure(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use serde_json::json;

    use super::*;

    #[test]
    fn results_are_forwarded_and_confirmed() {
        let (sender, receiver) = mpsc::sync_channel(4);
        let listener = ResultListener::new(sender);

        let reply = listener.handle(Message::ok().with_result(json!({ "imported": "/a.obj" })));

        assert_eq!(reply, Message::confirmation(Status::Ok));
        assert_eq!(
            receiver.try_recv().expect("notification"),
            Notification::Result {
                value: json!({ "imported": "/a.obj" }),
                info: None,
            }
        );
    }

    #[test]
    fn failures_are_still_confirmed() {
        let (sender, receiver) = mpsc::sync_channel(4);
        let listener = ResultListener::new(sender);

        let reply = listener.handle(Message::fail("Command has no receiver"));

        assert!(reply.is_ok());
        assert!(receiver.try_recv().expect("notification").is_failure());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (sender, receiver) = mpsc::sync_channel(1);
        let listener = ResultListener::new(sender);

        listener.handle(Message::ok().with_info("first"));
        let reply = listener.handle(Message::ok().with_info("second"));

        assert!(reply.is_ok());
        assert_eq!(
            receiver.try_recv().expect("first"),
            Notification::Info("first".to_owned())
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn undecodable_messages_become_failures() {
        let (sender, receiver) = mpsc::sync_channel(1);
        let listener = ResultListener::new(sender);

        listener.rejected(&CodecError::TooLarge {
            size: 9,
            max_size: 8,
        });

        assert!(matches!(
            receiver.try_recv().expect("notification"),
            Notification::Failure(_)
        ));
    }
}
