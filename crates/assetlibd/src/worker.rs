//! The single consumer of the work queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use assetlib_protocol::{BoundCommand, Message};
use tracing::{debug, info, warn};

use crate::clients::ClientChannel;
use crate::history::{History, HistoryEntry};
use crate::queue::WorkQueue;

const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// A queued command and the channel its result goes back through.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) command: BoundCommand,
    pub(crate) client: Arc<ClientChannel>,
}

/// Executes queued jobs one at a time, in order.
pub(crate) struct Worker {
    queue: Arc<WorkQueue<Job>>,
    history: Arc<History>,
}

impl Worker {
    pub(crate) const fn new(queue: Arc<WorkQueue<Job>>, history: Arc<History>) -> Self {
        Self { queue, history }
    }

    /// Runs until the queue is closed.
    pub(crate) fn run(&self) {
        debug!(target: WORKER_TARGET, "worker started");
        while let Some(job) = self.queue.pop() {
            self.process(&job);
            self.queue.task_done();
        }
        debug!(target: WORKER_TARGET, "worker stopped");
    }

    fn process(&self, job: &Job) {
        let command = job.command.command();
        let client = job.client.id();
        let result = execute(&job.command);
        info!(
            target: WORKER_TARGET,
            command = %command,
            client,
            status = ?result.status_or_fail(),
            "command executed"
        );
        self.history.record(HistoryEntry::new(
            command.to_string(),
            Some(client.to_owned()),
            &result,
        ));

        match job.client.deliver(&result) {
            Ok(confirmation) if confirmation.is_ok() => {
                debug!(target: WORKER_TARGET, client, "result confirmed");
            }
            Ok(confirmation) => warn!(
                target: WORKER_TARGET,
                client,
                reason = %confirmation.failure_text(),
                "client did not confirm result"
            ),
            Err(error) => warn!(
                target: WORKER_TARGET,
                client,
                error = %error,
                "failed to deliver result"
            ),
        }
    }
}

/// Runs a command, turning errors and panics into a `fail` result.
pub(crate) fn execute(command: &BoundCommand) -> Message {
    match panic::catch_unwind(AssertUnwindSafe(|| command.execute())) {
        Ok(Ok(value)) => Message::ok().with_result(value),
        Ok(Err(error)) => Message::fail(error.to_string()),
        Err(payload) => Message::fail("command panicked").with_error(panic_text(payload.as_ref())),
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
mod tests {
    use assetlib_protocol::{Command, ReceiverError, Status};
    use serde_json::json;

    use super::*;
    use crate::tests::support::MockReceiverHost;

    #[test]
    fn unbound_import_fails_with_no_receiver() {
        let result = execute(&Command::import("/a.obj").unbound());
        assert_eq!(result.status, Some(Status::Fail));
        assert_eq!(result.info.as_deref(), Some("Command has no receiver"));
    }

    #[test]
    fn panics_become_failures() {
        let mut receiver = MockReceiverHost::new();
        receiver
            .expect_import_file()
            .returning(|_| panic!("scene exploded"));

        let result = execute(&Command::import("/a.obj").bind(Arc::new(receiver)));

        assert_eq!(result.status, Some(Status::Fail));
        assert_eq!(result.info.as_deref(), Some("command panicked"));
        assert_eq!(result.error.as_deref(), Some("scene exploded"));
    }

    #[test]
    fn receiver_errors_become_failures() {
        let mut receiver = MockReceiverHost::new();
        receiver
            .expect_import_reference()
            .returning(|_| Err(ReceiverError::failed("read-only scene")));

        let result = execute(&Command::reference("/a.ma").bind(Arc::new(receiver)));
        assert_eq!(result.info.as_deref(), Some("read-only scene"));
    }

    #[test]
    fn results_carry_the_receiver_value() {
        let mut receiver = MockReceiverHost::new();
        receiver
            .expect_import_file()
            .returning(|path| Ok(json!({ "imported": path })));

        let result = execute(&Command::import("/a.obj").bind(Arc::new(receiver)));
        assert!(result.is_ok());
        assert_eq!(result.result, Some(json!({ "imported": "/a.obj" })));
    }
}
