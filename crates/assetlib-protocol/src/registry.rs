//! Name-to-constructor table used to rebuild commands from requests.

use std::collections::BTreeMap;
use std::fmt;

use crate::command::{
    Action, ArgumentReader, Command, parse_connect, parse_import, parse_reference, parse_sleep,
    parse_time,
};
use crate::error::CommandError;
use crate::message::Message;

/// Builds an [`Action`] from a request's arguments.
pub type ActionParser = fn(&ArgumentReader<'_>) -> Result<Action, CommandError>;

/// One entry in a [`CommandRegistry`].
#[derive(Clone, Copy)]
pub struct CommandSpec {
    name: &'static str,
    summary: &'static str,
    parser: ActionParser,
}

impl CommandSpec {
    /// Describes a command under its canonical name.
    #[must_use]
    pub const fn new(name: &'static str, summary: &'static str, parser: ActionParser) -> Self {
        Self {
            name,
            summary,
            parser,
        }
    }

    /// Canonical name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// One-line description for help output.
    #[must_use]
    pub const fn summary(&self) -> &'static str {
        self.summary
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

const STANDARD_COMMANDS: [CommandSpec; 5] = [
    CommandSpec::new("connect", "register a reply endpoint", parse_connect),
    CommandSpec::new("import", "import a file into the host", parse_import),
    CommandSpec::new("reference", "reference a file into the host", parse_reference),
    CommandSpec::new("time", "report the server time", parse_time),
    CommandSpec::new("sleep", "pause the worker for some seconds", parse_sleep),
];

/// The set of commands a server accepts.
///
/// The registry is passed to whoever decodes requests; there is no global
/// table.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandSpec>,
}

impl CommandRegistry {
    /// A registry with no commands.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in commands: connect, import, reference, time and sleep.
    #[must_use]
    pub fn standard() -> Self {
        STANDARD_COMMANDS
            .into_iter()
            .fold(Self::empty(), Self::with_command)
    }

    /// Adds or replaces a command.
    #[must_use]
    pub fn with_command(mut self, spec: CommandSpec) -> Self {
        self.commands.insert(canonical_name(spec.name), spec);
        self
    }

    /// Looks up a command by any spelling [`canonical_name`] accepts.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(&canonical_name(name))
    }

    /// Whether the command is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Rebuilds the command a request describes, stamped with its `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownCommand`] when the request names no
    /// registered command, and [`CommandError::InvalidArguments`] when the
    /// arguments do not fit.
    pub fn parse(&self, message: &Message) -> Result<Command, CommandError> {
        let name = message.command_name().unwrap_or_default();
        let spec = self
            .get(name)
            .ok_or_else(|| CommandError::unknown(name))?;
        let reader = ArgumentReader::new(spec.name, &message.args, &message.kwargs);
        let action = (spec.parser)(&reader)?;
        let command = Command::new(action).with_blocking(reader.blocking()?);
        Ok(match &message.id {
            Some(id) => command.with_id(id.clone()),
            None => command,
        })
    }
}

/// Normalises a command name for lookup.
///
/// Module paths and a trailing `Command` are stripped and the rest is
/// lowercased, so `ImportCommand`, `lib::ImportCommand` and ` import ` all
/// resolve to `import`.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    let trimmed = name.trim();
    let last = trimmed
        .rsplit(['.', ':'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(trimmed);
    let base = match last.strip_suffix("Command") {
        Some(stem) if !stem.is_empty() => stem,
        _ => last,
    };
    base.to_ascii_lowercase()
}
