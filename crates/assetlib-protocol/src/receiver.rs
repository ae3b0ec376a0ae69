//! Capability surface commands are allowed to call on the host.

use serde_json::Value;
use thiserror::Error;

/// The object a command's effect is performed on, typically a host
/// application able to import assets.
///
/// Every operation has a default body reporting the capability as missing,
/// so a host only implements what it supports. Commands that reach a missing
/// capability fail as incomplete.
#[cfg_attr(test, mockall::automock)]
pub trait Receiver: Send + Sync {
    /// Records that a client endpoint is interested in this host.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError`] when the host rejects the endpoint or does
    /// not support registration.
    fn register(&self, _endpoint: &str) -> Result<Value, ReceiverError> {
        Err(ReceiverError::Unsupported {
            operation: "register",
        })
    }

    /// Imports the file at `path` into the host scene.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError`] when the import fails or is unsupported.
    fn import_file(&self, _path: &str) -> Result<Value, ReceiverError> {
        Err(ReceiverError::Unsupported {
            operation: "import_file",
        })
    }

    /// Brings the file at `path` into the host scene as a reference.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError`] when referencing fails or is unsupported.
    fn import_reference(&self, _path: &str) -> Result<Value, ReceiverError> {
        Err(ReceiverError::Unsupported {
            operation: "import_reference",
        })
    }
}

/// Failures reported by a [`Receiver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiverError {
    /// The host does not provide the requested operation.
    #[error("receiver does not support {operation}")]
    Unsupported {
        /// Name of the missing operation.
        operation: &'static str,
    },
    /// The host attempted the operation and it failed.
    #[error("{message}")]
    Failed {
        /// Host-provided description.
        message: String,
    },
}

impl ReceiverError {
    /// Builds a failure with a host-provided description.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ImportOnly;

    impl Receiver for ImportOnly {
        fn import_file(&self, path: &str) -> Result<Value, ReceiverError> {
            Ok(Value::String(path.to_owned()))
        }
    }

    #[test]
    fn unimplemented_operations_report_unsupported() {
        let receiver = ImportOnly;
        assert!(receiver.import_file("/a.obj").is_ok());
        assert_eq!(
            receiver.import_reference("/a.obj"),
            Err(ReceiverError::Unsupported {
                operation: "import_reference"
            })
        );
    }
}
