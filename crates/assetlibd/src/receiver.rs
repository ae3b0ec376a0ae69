//! Host stand-in used when no content-creation application is attached.

use assetlib_protocol::{Receiver, ReceiverError};
use serde_json::{Value, json};
use tracing::info;

const RECEIVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::receiver");

/// Receiver that logs each call and reports it as done.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReceiver;

impl Receiver for LoggingReceiver {
    fn register(&self, endpoint: &str) -> Result<Value, ReceiverError> {
        info!(target: RECEIVER_TARGET, endpoint, "register");
        Ok(json!({ "registered": endpoint }))
    }

    fn import_file(&self, path: &str) -> Result<Value, ReceiverError> {
        info!(target: RECEIVER_TARGET, path, "import file");
        Ok(json!({ "imported": path }))
    }

    fn import_reference(&self, path: &str) -> Result<Value, ReceiverError> {
        info!(target: RECEIVER_TARGET, path, "import reference");
        Ok(json!({ "referenced": path }))
    }
}
