//! Server bootstrap orchestration.

use std::sync::Arc;

use assetlib_config::{Config, ConfigError};
use assetlib_protocol::Receiver;
use assetlib_telemetry::{self as telemetry, TelemetryError, TelemetryHandle};
use thiserror::Error;

use crate::health::HealthReporter;
use crate::server::{Server, ServerError, ServerHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any configuration layer is invalid.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that delegates to [`Config::resolve`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::resolve()
    }
}

/// Loader returning a configuration built in advance.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// A bootstrapped but not yet listening server process.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Starts serving commands against `receiver`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the endpoints cannot be bound.
    pub fn serve(&self, receiver: Arc<dyn Receiver>) -> Result<ServerHandle, ServerError> {
        Server::new(&self.config, receiver)
            .with_reporter(Arc::clone(&self.reporter))
            .start()
    }
}

/// Loads configuration and installs telemetry, reporting each step.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fails; the
/// reporter has been told about the failure by then.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        telemetry,
        reporter,
    })
}
