//! Control endpoint: registration and server queries.

use std::sync::Arc;

use assetlib_protocol::{Message, canonical_name};
use assetlib_transport::MessageHandler;
use serde_json::Value;
use tracing::{debug, warn};

use super::DISPATCH_TARGET;
use crate::clients::{ClientRegistry, Registration};
use crate::health::HealthReporter;
use crate::history::History;

/// Answers `connect`, `clients` and `history` requests.
pub(crate) struct ControlHandler {
    clients: Arc<ClientRegistry>,
    history: Arc<History>,
    reporter: Arc<dyn HealthReporter>,
}

impl ControlHandler {
    pub(crate) fn new(
        clients: Arc<ClientRegistry>,
        history: Arc<History>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            clients,
            history,
            reporter,
        }
    }

    fn connect(&self, request: &Message) -> Message {
        let Some(endpoint) = connect_endpoint(request) else {
            return Message::fail("connect requires a client endpoint");
        };
        match self.clients.register(endpoint) {
            Ok(registration) => {
                self.reporter.client_registered(endpoint, registration);
                let note = match registration {
                    Registration::New => "registered",
                    Registration::Existing => "already registered",
                };
                Message::ok().with_info(note)
            }
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    endpoint,
                    error = %error,
                    "client registration failed"
                );
                Message::fail(error.to_string())
            }
        }
    }

    fn clients(&self) -> Message {
        let ids = self.clients.ids().into_iter().map(Value::String).collect();
        Message::ok().with_result(Value::Array(ids))
    }

    fn history(&self) -> Message {
        match serde_json::to_value(self.history.snapshot()) {
            Ok(entries) => Message::ok().with_result(entries),
            Err(error) => Message::fail("history unavailable").with_error(error.to_string()),
        }
    }
}

impl MessageHandler for ControlHandler {
    fn handle(&self, request: Message) -> Message {
        let Some(name) = request.command_name().map(canonical_name) else {
            return Message::fail("request has no command");
        };
        debug!(
            target: DISPATCH_TARGET,
            command = %name,
            id = request.id.as_deref(),
            "control request"
        );
        match name.as_str() {
            "connect" => self.connect(&request),
            "clients" => self.clients(),
            "history" => self.history(),
            _ => Message::fail(format!("'{name}' not available")),
        }
    }
}

/// Endpoint named by a `connect` request: first positional argument, then
/// the `endpoint` keyword, then the sender's `id`.
fn connect_endpoint(request: &Message) -> Option<&str> {
    request
        .args
        .first()
        .and_then(Value::as_str)
        .or_else(|| request.kwargs.get("endpoint").and_then(Value::as_str))
        .or(request.id.as_deref())
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
}
