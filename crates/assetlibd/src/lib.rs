//! Command dispatch server for the asset library.
//!
//! Clients register an inbound endpoint on the control socket and submit
//! commands on the command socket. Submissions are validated, bound to the
//! host [`Receiver`](assetlib_protocol::Receiver) and appended to a single
//! FIFO queue. One worker thread executes queued commands in order, pushes
//! each result to the originating client, and waits for the client's
//! confirmation before taking the next one. Blocking submissions are
//! acknowledged only once the queue has drained.
//!
//! Failures never escape a listener or the worker: unknown commands, bad
//! arguments, unregistered clients, receiver errors and panics all become
//! `fail` replies.

mod bootstrap;
mod clients;
mod dispatch;
mod health;
mod history;
mod process;
mod queue;
mod receiver;
mod server;
mod worker;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use clients::{ClientChannel, ClientRegistry, Registration, RegistrationError};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use history::{History, HistoryEntry};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use queue::{QueueClosed, WorkQueue};
pub use receiver::LoggingReceiver;
pub use server::{Server, ServerError, ServerHandle};
pub use assetlib_telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
