//! Commands: serialisable units of work and their execution.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{Number, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::CommandError;
use crate::message::{KeywordArguments, Message};
use crate::receiver::Receiver;

/// Keyword under which the blocking flag travels in `kwargs`.
pub const BLOCKING_KEY: &str = "blocking";

/// Longest pause a `sleep` command may request.
pub const MAX_SLEEP: Duration = Duration::from_secs(3600);

/// The effect a command has once executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Registers a reply endpoint with the receiver.
    Connect {
        /// Endpoint being registered.
        endpoint: String,
    },
    /// Imports a file into the host.
    Import {
        /// File to import.
        path: String,
    },
    /// Brings a file into the host as a reference.
    Reference {
        /// File to reference.
        path: String,
    },
    /// Reports the server's current time.
    Time,
    /// Pauses the worker for a while.
    Sleep {
        /// How long to pause.
        duration: Duration,
    },
}

impl Action {
    /// Canonical command name of this action.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Import { .. } => "import",
            Self::Reference { .. } => "reference",
            Self::Time => "time",
            Self::Sleep { .. } => "sleep",
        }
    }

    fn positional(&self) -> Vec<Value> {
        match self {
            Self::Connect { endpoint } => vec![Value::String(endpoint.clone())],
            Self::Import { path } | Self::Reference { path } => vec![Value::String(path.clone())],
            Self::Time => Vec::new(),
            Self::Sleep { duration } => Number::from_f64(duration.as_secs_f64())
                .map(Value::Number)
                .into_iter()
                .collect(),
        }
    }
}

/// A unit of work requested by a client.
///
/// A command holds only what crosses the wire: its action, the blocking
/// flag, and the identifier of the client it belongs to. The receiver it
/// operates on is attached later with [`Command::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    action: Action,
    blocking: bool,
    id: Option<String>,
}

impl Command {
    /// Wraps an action into a non-blocking command without an owner.
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self {
            action,
            blocking: false,
            id: None,
        }
    }

    /// Registers `endpoint` for result delivery.
    #[must_use]
    pub fn connect(endpoint: impl Into<String>) -> Self {
        Self::new(Action::Connect {
            endpoint: endpoint.into(),
        })
    }

    /// Imports the file at `path`.
    #[must_use]
    pub fn import(path: impl Into<String>) -> Self {
        Self::new(Action::Import { path: path.into() })
    }

    /// References the file at `path`.
    #[must_use]
    pub fn reference(path: impl Into<String>) -> Self {
        Self::new(Action::Reference { path: path.into() })
    }

    /// Asks for the server's current time.
    #[must_use]
    pub const fn time() -> Self {
        Self::new(Action::Time)
    }

    /// Pauses the worker for `duration`.
    #[must_use]
    pub const fn sleep(duration: Duration) -> Self {
        Self::new(Action::Sleep { duration })
    }

    /// Sets whether submission waits for the queue to drain.
    #[must_use]
    pub const fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Stamps the owning client endpoint.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Action performed by this command.
    #[must_use]
    pub const fn action(&self) -> &Action {
        &self.action
    }

    /// Canonical command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.action.name()
    }

    /// Whether submission waits for the queue to drain.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Owning client endpoint, if stamped.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Serialises the command into a request message.
    ///
    /// Parameters travel positionally; the blocking flag travels in
    /// `kwargs` only when set.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut kwargs = KeywordArguments::new();
        if self.blocking {
            kwargs.insert(BLOCKING_KEY.to_owned(), Value::Bool(true));
        }
        let mut message = Message::request(self.name())
            .with_args(self.action.positional())
            .with_kwargs(kwargs);
        message.id.clone_from(&self.id);
        message
    }

    /// Rebuilds an unbound command from a request message.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownCommand`] when the name is not
    /// registered and [`CommandError::InvalidArguments`] when the arguments
    /// do not fit the command.
    pub fn from_message(
        message: &Message,
        registry: &crate::registry::CommandRegistry,
    ) -> Result<Self, CommandError> {
        registry.parse(message)
    }

    /// Attaches the receiver the command will operate on.
    #[must_use]
    pub fn bind(self, receiver: Arc<dyn Receiver>) -> BoundCommand {
        BoundCommand {
            command: self,
            receiver: Some(receiver),
        }
    }

    /// Prepares the command for execution without a receiver.
    #[must_use]
    pub const fn unbound(self) -> BoundCommand {
        BoundCommand {
            command: self,
            receiver: None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Action::Connect { endpoint } => write!(formatter, "connect {endpoint}"),
            Action::Import { path } => write!(formatter, "import {path}"),
            Action::Reference { path } => write!(formatter, "reference {path}"),
            Action::Time => formatter.write_str("time"),
            Action::Sleep { duration } => write!(formatter, "sleep {}s", duration.as_secs_f64()),
        }
    }
}

/// A command together with the receiver it runs against.
pub struct BoundCommand {
    command: Command,
    receiver: Option<Arc<dyn Receiver>>,
}

impl BoundCommand {
    /// The wrapped command.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// Whether a receiver is attached.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.receiver.is_some()
    }

    /// Performs the command's effect and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Incomplete`] when the command needs a
    /// receiver and none is bound, or when the receiver lacks the
    /// capability; other receiver failures are passed through.
    pub fn execute(&self) -> Result<Value, CommandError> {
        match &self.command.action {
            Action::Connect { endpoint } => Ok(self.receiver()?.register(endpoint)?),
            Action::Import { path } => Ok(self.receiver()?.import_file(path)?),
            Action::Reference { path } => Ok(self.receiver()?.import_reference(path)?),
            Action::Time => OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .map(Value::String)
                .map_err(|error| CommandError::Execution {
                    message: error.to_string(),
                }),
            Action::Sleep { duration } => {
                thread::sleep(*duration);
                Ok(json!({ "slept": duration.as_secs_f64() }))
            }
        }
    }

    fn receiver(&self) -> Result<&dyn Receiver, CommandError> {
        self.receiver.as_deref().ok_or_else(CommandError::no_receiver)
    }
}

impl fmt::Debug for BoundCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BoundCommand")
            .field("command", &self.command)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Reads a command's parameters from positional and named arguments.
///
/// A parameter may be given by position or by name, never both. Named
/// arguments other than the declared parameters and the blocking flag are
/// rejected, as are surplus positional arguments.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentReader<'a> {
    command: &'static str,
    args: &'a [Value],
    kwargs: &'a KeywordArguments,
}

impl<'a> ArgumentReader<'a> {
    /// Creates a reader over a request's arguments.
    #[must_use]
    pub const fn new(command: &'static str, args: &'a [Value], kwargs: &'a KeywordArguments) -> Self {
        Self {
            command,
            args,
            kwargs,
        }
    }

    /// Rejects arguments not covered by `parameters`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidArguments`] for surplus positional
    /// arguments or unknown names.
    pub fn expect_parameters(&self, parameters: &[&str]) -> Result<(), CommandError> {
        if self.args.len() > parameters.len() {
            return Err(self.invalid(format!(
                "expected at most {} positional argument(s), got {}",
                parameters.len(),
                self.args.len()
            )));
        }
        if let Some(unknown) = self
            .kwargs
            .keys()
            .find(|key| key.as_str() != BLOCKING_KEY && !parameters.contains(&key.as_str()))
        {
            return Err(self.invalid(format!("unexpected keyword argument '{unknown}'")));
        }
        Ok(())
    }

    /// Looks up a parameter by position or name.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidArguments`] when the parameter is given
    /// both ways.
    pub fn value(&self, position: usize, name: &str) -> Result<Option<&'a Value>, CommandError> {
        match (self.args.get(position), self.kwargs.get(name)) {
            (Some(_), Some(_)) => Err(self.invalid(format!("'{name}' given twice"))),
            (positional, named) => Ok(positional.or(named)),
        }
    }

    /// Reads a required non-empty string parameter.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidArguments`] when the parameter is
    /// missing, not a string, or blank.
    pub fn string(&self, position: usize, name: &str) -> Result<String, CommandError> {
        match self.value(position, name)? {
            Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
            Some(Value::String(_)) => Err(self.invalid(format!("'{name}' is empty"))),
            Some(other) => Err(self.invalid(format!("'{name}' must be a string, got {other}"))),
            None => Err(self.invalid(format!("missing required argument '{name}'"))),
        }
    }

    /// Reads a required duration given in (possibly fractional) seconds.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidArguments`] when the parameter is
    /// missing, not a non-negative number, or longer than [`MAX_SLEEP`].
    pub fn seconds(&self, position: usize, name: &str) -> Result<Duration, CommandError> {
        let value = self
            .value(position, name)?
            .ok_or_else(|| self.invalid(format!("missing required argument '{name}'")))?;
        let seconds = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| self.invalid(format!("'{name}' must be a number of seconds")))?;
        let duration = Duration::try_from_secs_f64(seconds)
            .map_err(|_| self.invalid(format!("'{name}' must be a non-negative number")))?;
        if duration > MAX_SLEEP {
            return Err(self.invalid(format!(
                "'{name}' exceeds the {} second limit",
                MAX_SLEEP.as_secs()
            )));
        }
        Ok(duration)
    }

    /// Reads the blocking flag, defaulting to `false`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidArguments`] when the flag is not a
    /// boolean.
    pub fn blocking(&self) -> Result<bool, CommandError> {
        match self.kwargs.get(BLOCKING_KEY) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(other) => Err(self.invalid(format!("'{BLOCKING_KEY}' must be a boolean, got {other}"))),
        }
    }

    fn invalid(&self, message: String) -> CommandError {
        CommandError::invalid_arguments(self.command, message)
    }
}

pub(crate) fn parse_connect(reader: &ArgumentReader<'_>) -> Result<Action, CommandError> {
    reader.expect_parameters(&["endpoint"])?;
    Ok(Action::Connect {
        endpoint: reader.string(0, "endpoint")?,
    })
}

pub(crate) fn parse_import(reader: &ArgumentReader<'_>) -> Result<Action, CommandError> {
    reader.expect_parameters(&["path"])?;
    Ok(Action::Import {
        path: reader.string(0, "path")?,
    })
}

pub(crate) fn parse_reference(reader: &ArgumentReader<'_>) -> Result<Action, CommandError> {
    reader.expect_parameters(&["path"])?;
    Ok(Action::Reference {
        path: reader.string(0, "path")?,
    })
}

pub(crate) fn parse_time(reader: &ArgumentReader<'_>) -> Result<Action, CommandError> {
    reader.expect_parameters(&[])?;
    Ok(Action::Time)
}

pub(crate) fn parse_sleep(reader: &ArgumentReader<'_>) -> Result<Action, CommandError> {
    reader.expect_parameters(&["seconds"])?;
    Ok(Action::Sleep {
        duration: reader.seconds(0, "seconds")?,
    })
}
