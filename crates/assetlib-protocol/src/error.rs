//! Failures raised while resolving or executing commands.

use thiserror::Error;

use crate::receiver::ReceiverError;

/// Text reported when a command runs without a bound receiver.
pub(crate) const NO_RECEIVER: &str = "Command has no receiver";

/// Errors surfaced by command resolution and execution.
///
/// None of these terminate a server loop: listeners and the worker convert
/// them into `fail` replies whose `info` is the display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command name is not in the registry.
    #[error("'{name}' not available")]
    UnknownCommand {
        /// Name that was requested.
        name: String,
    },
    /// The command needs a receiver capability that is not there.
    #[error("{message}")]
    Incomplete {
        /// What is missing.
        message: String,
    },
    /// Arguments do not match the command's parameters.
    #[error("invalid arguments for '{command}': {message}")]
    InvalidArguments {
        /// Command being constructed.
        command: &'static str,
        /// What was wrong.
        message: String,
    },
    /// The receiver attempted the operation and failed.
    #[error("{0}")]
    Receiver(ReceiverError),
    /// The command failed on its own, without involving the receiver.
    #[error("{message}")]
    Execution {
        /// Failure description.
        message: String,
    },
}

impl CommandError {
    /// Creates an unknown command error.
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownCommand { name: name.into() }
    }

    /// Creates the error reported for a command without a receiver.
    #[must_use]
    pub fn no_receiver() -> Self {
        Self::Incomplete {
            message: NO_RECEIVER.to_owned(),
        }
    }

    /// Creates an invalid arguments error.
    #[must_use]
    pub fn invalid_arguments(command: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            command,
            message: message.into(),
        }
    }

    /// Short machine-readable category.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand { .. } => "unknown_command",
            Self::Incomplete { .. } => "incomplete",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::Receiver(_) => "receiver",
            Self::Execution { .. } => "execution",
        }
    }
}

impl From<ReceiverError> for CommandError {
    fn from(error: ReceiverError) -> Self {
        match error {
            ReceiverError::Unsupported { .. } => Self::Incomplete {
                message: error.to_string(),
            },
            ReceiverError::Failed { .. } => Self::Receiver(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_text_quotes_the_name() {
        assert_eq!(
            CommandError::unknown("frobnicate").to_string(),
            "'frobnicate' not available"
        );
    }

    #[test]
    fn unsupported_capability_is_incomplete() {
        let error = CommandError::from(ReceiverError::Unsupported {
            operation: "import_reference",
        });
        assert_eq!(error.kind(), "incomplete");
        assert_eq!(error.to_string(), "receiver does not support import_reference");
    }

    #[test]
    fn receiver_failures_keep_their_text() {
        let error = CommandError::from(ReceiverError::failed("scene is read-only"));
        assert_eq!(error.kind(), "receiver");
        assert_eq!(error.to_string(), "scene is read-only");
    }
}
