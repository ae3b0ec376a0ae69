//! Error types for the CLI runtime.

use std::io;

use assetlib_config::ConfigError;
use assetlib_telemetry::TelemetryError;
use thiserror::Error;

use crate::invoker::InvokerError;

/// Failures that end a CLI invocation.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be resolved.
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] ConfigError),
    /// Logging could not be set up.
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    /// Talking to the server failed.
    #[error(transparent)]
    Invoker(#[from] InvokerError),
    /// Reading input or writing output failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    /// `--wait` gave up before a result arrived.
    #[error("no result arrived before the timeout")]
    NoResult,
}
