//! Foreground process supervision: run until a termination signal arrives.

use std::io;
use std::sync::Arc;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use assetlib_protocol::Receiver;

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::receiver::LoggingReceiver;
use crate::server::ServerError;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] if the notification source cannot be set up.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for SIGTERM, SIGINT, SIGQUIT or SIGHUP.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(
                target: PROCESS_TARGET,
                signal,
                "shutdown signal received"
            );
        }
        Ok(())
    }
}

/// Errors surfaced while running the server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping failed.
    #[error("server bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The server failed to start or stop cleanly.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

/// Runs the server with the production collaborators until a signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, startup or shutdown fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(LoggingReceiver),
        &SystemShutdownSignal,
    )
}

/// Runs the server with injected collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, startup or shutdown fails.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    receiver: Arc<dyn Receiver>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    let server = daemon.serve(receiver)?;
    let waited = shutdown.wait();
    server.shutdown();
    server.join()?;
    waited?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use assetlib_config::{Config, SocketEndpoint};

    use super::*;
    use crate::bootstrap::StaticConfigLoader;

    struct Immediate;

    impl ShutdownSignal for Immediate {
        fn wait(&self) -> Result<(), ShutdownError> {
            Ok(())
        }
    }

    #[test]
    fn run_stops_when_shutdown_is_signalled() {
        let config = Config {
            control_socket: SocketEndpoint::tcp("127.0.0.1", 0),
            command_socket: SocketEndpoint::tcp("127.0.0.1", 0),
            ..Config::default()
        };
        run_daemon_with(
            &StaticConfigLoader::new(config),
            Arc::new(StructuredHealthReporter::new()),
            Arc::new(LoggingReceiver),
            &Immediate,
        )
        .expect("run and stop");
    }
}
