//! Client runtime for the asset library command server.
//!
//! The [`Invoker`] is the programmatic entry point: a browser front end calls
//! [`Invoker::import`] and watches notifications. The `assetlib` binary wraps
//! it in an interactive shell and a handful of one-shot subcommands. IO
//! streams are injected so the runtime can be driven from tests.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use assetlib_config::Config;
use assetlib_protocol::{BLOCKING_KEY, KeywordArguments, Message};
use clap::Parser;
use serde_json::Value;

mod cli;
mod config;
mod errors;
mod invoker;
mod listener;
mod shell;

use cli::{Cli, CliCommand};
pub use errors::AppError;
pub use invoker::{Invoker, InvokerError, InvokerSettings, InvokerState, NOTIFICATION_CAPACITY};

pub(crate) const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Runs the CLI with the provided arguments and IO handles.
///
/// Leading configuration flags are resolved together with the environment
/// and configuration file; the rest selects the subcommand. Log events go to
/// the process standard error, not to `stderr`.
#[must_use]
pub fn run<I, R, W, E>(args: I, stdin: R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let split = config::split_config_arguments(args);
    let cli = match Cli::try_parse_from(split.command) {
        Ok(cli) => cli,
        Err(error) => {
            let rendered = error.render();
            if error.use_stderr() {
                drop(write!(stderr, "{rendered}"));
                return ExitCode::FAILURE;
            }
            drop(write!(stdout, "{rendered}"));
            return ExitCode::SUCCESS;
        }
    };

    match execute(cli, split.config, stdin, stdout, stderr) {
        Ok(code) => code,
        Err(error) => {
            drop(writeln!(stderr, "assetlib: {error}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<R, W, E>(
    cli: Cli,
    config_args: Vec<OsString>,
    stdin: R,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    let config = Config::resolve_from_iter(config_args)?;
    assetlib_telemetry::initialise(&config)?;
    let wait_limit = config.request_timeout();
    let mut invoker = Invoker::new(InvokerSettings::from_config(&config));

    let outcome = match cli.command.unwrap_or(CliCommand::Shell) {
        CliCommand::Shell => invoker
            .connect()
            .map_err(AppError::from)
            .and_then(|()| shell::run_shell(&mut invoker, stdin, stdout, stderr).map_err(AppError::from))
            .map(|()| ExitCode::SUCCESS),
        CliCommand::Clients => list_clients(&invoker, stdout),
        CliCommand::Import { path, wait } => invoker
            .connect()
            .and_then(|()| invoker.import(path.to_string_lossy()))
            .map_err(AppError::from)
            .and_then(|ack| report(&invoker, &ack, wait, wait_limit, stdout)),
        CliCommand::Exec {
            name,
            args,
            blocking,
            wait,
        } => {
            let mut kwargs = KeywordArguments::new();
            if blocking {
                kwargs.insert(BLOCKING_KEY.to_owned(), Value::Bool(true));
            }
            let values = args.into_iter().map(Value::String).collect();
            invoker
                .connect()
                .and_then(|()| invoker.submit(&name, values, kwargs))
                .map_err(AppError::from)
                .and_then(|ack| report(&invoker, &ack, wait, wait_limit, stdout))
        }
    };

    let closed = invoker.close();
    let code = outcome?;
    closed?;
    Ok(code)
}

fn list_clients<W: Write>(invoker: &Invoker, stdout: &mut W) -> Result<ExitCode, AppError> {
    for client in invoker.clients()? {
        writeln!(stdout, "{client}")?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the acknowledgement and any results, waiting for one when asked.
///
/// Blocking submissions are acknowledged after their results were confirmed,
/// so those results are already queued locally.
fn report<W: Write>(
    invoker: &Invoker,
    ack: &Message,
    wait: bool,
    limit: Option<Duration>,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    writeln!(stdout, "{}", ack.info.as_deref().unwrap_or("ok"))?;

    let mut notifications = invoker.pending_notifications();
    if wait && notifications.is_empty() {
        let notification = invoker
            .wait_for_notification(limit)
            .ok_or(AppError::NoResult)?;
        notifications.push(notification);
    }

    let mut failed = false;
    for notification in &notifications {
        writeln!(stdout, "{notification}")?;
        failed |= notification.is_failure();
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
