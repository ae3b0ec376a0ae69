//! Structured health reporting for server lifecycle events.

use std::sync::Arc;

use assetlib_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;
use crate::clients::Registration;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once both listeners accept connections.
    fn server_listening(&self, control: &SocketEndpoint, command: &SocketEndpoint);

    /// Invoked after a `connect` request has been handled.
    fn client_registered(&self, endpoint: &str, registration: Registration);

    /// Invoked when shutdown begins.
    fn shutdown_started(&self);

    /// Invoked once every server thread has stopped.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn server_listening(&self, control: &SocketEndpoint, command: &SocketEndpoint) {
        (**self).server_listening(control, command);
    }

    fn client_registered(&self, endpoint: &str, registration: Registration) {
        (**self).client_registered(endpoint, registration);
    }

    fn shutdown_started(&self) {
        (**self).shutdown_started();
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting server bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            control_socket = %config.control_socket(),
            command_socket = %config.command_socket(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "server bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "server bootstrap failed"
        );
    }

    fn server_listening(&self, control: &SocketEndpoint, command: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_listening",
            control = %control,
            command = %command,
            "server accepting requests"
        );
    }

    fn client_registered(&self, endpoint: &str, registration: Registration) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "client_registered",
            endpoint,
            new = registration == Registration::New,
            "client connected"
        );
    }

    fn shutdown_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_started",
            "server shutting down"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "server stopped"
        );
    }
}
