//! Message envelope exchanged on every channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named arguments carried by a request.
pub type KeywordArguments = Map<String, Value>;

/// Outcome marker carried by every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The request succeeded.
    Ok,
    /// The request failed; `info` usually explains why.
    Fail,
}

/// A single protocol message.
///
/// Requests carry `command`, `args`, `kwargs` and `id`; replies carry
/// `status` and optionally `result`, `info` and `error`. Empty fields are
/// omitted from the encoded form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Command name on requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Named arguments.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: KeywordArguments,
    /// Endpoint of the client the request originates from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Outcome of a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Return value of an executed command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Human-readable note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// Starts a request for the named command.
    #[must_use]
    pub fn request(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// A bare successful reply.
    #[must_use]
    pub fn ok() -> Self {
        Self::confirmation(Status::Ok)
    }

    /// A failed reply explaining what went wrong.
    #[must_use]
    pub fn fail(info: impl Into<String>) -> Self {
        Self::confirmation(Status::Fail).with_info(info)
    }

    /// A reply carrying nothing but a status.
    #[must_use]
    pub fn confirmation(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Replaces the positional arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Replaces the named arguments.
    #[must_use]
    pub fn with_kwargs(mut self, kwargs: KeywordArguments) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Stamps the originating client endpoint.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attaches a result value.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Attaches a human-readable note.
    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Attaches error detail.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Status of a reply; a missing status counts as failure.
    #[must_use]
    pub fn status_or_fail(&self) -> Status {
        self.status.unwrap_or(Status::Fail)
    }

    /// Whether the reply reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status_or_fail() == Status::Ok
    }

    /// Trimmed command name of a request, if present and non-empty.
    #[must_use]
    pub fn command_name(&self) -> Option<&str> {
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Short description of a failed reply for logs and status lines.
    #[must_use]
    pub fn failure_text(&self) -> String {
        match (&self.info, &self.error) {
            (Some(info), Some(error)) => format!("{info}: {error}"),
            (Some(info), None) => info.clone(),
            (None, Some(error)) => error.clone(),
            (None, None) => "request failed".to_owned(),
        }
    }
}

/// What a client learns from one asynchronous result message.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A command completed and returned a value.
    Result {
        /// Returned value (`null` when the command produced nothing).
        value: Value,
        /// Optional note sent alongside the value.
        info: Option<String>,
    },
    /// An informational note without a result.
    Info(String),
    /// A command failed.
    Error {
        /// Failure description.
        info: Option<String>,
        /// Additional error detail.
        error: Option<String>,
    },
    /// An inbound message could not be decoded.
    Failure(String),
}

impl From<Message> for Notification {
    fn from(message: Message) -> Self {
        let ok = message.is_ok();
        let Message {
            result,
            info,
            error,
            ..
        } = message;
        if !ok || error.is_some() {
            return Self::Error { info, error };
        }
        match (result, info) {
            (Some(value), info) => Self::Result { value, info },
            (None, Some(info)) => Self::Info(info),
            (None, None) => Self::Result {
                value: Value::Null,
                info: None,
            },
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Result { value, info: None } => write!(f, "result: {value}"),
            Self::Result {
                value,
                info: Some(info),
            } => write!(f, "result: {value} ({info})"),
            Self::Info(info) => write!(f, "info: {info}"),
            Self::Error { info, error } => match (info, error) {
                (Some(info), Some(error)) => write!(f, "error: {info}: {error}"),
                (Some(text), None) | (None, Some(text)) => write!(f, "error: {text}"),
                (None, None) => f.write_str("error: command failed"),
            },
            Self::Failure(reason) => write!(f, "undecodable message: {reason}"),
        }
    }
}

impl Notification {
    /// Whether this notification reports a failed command or message.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Failure(_))
    }
}
