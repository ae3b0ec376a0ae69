//! CLI argument definitions for the asset library client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const CONFIG_HELP: &str = "\
Configuration flags must precede the subcommand:
  --config-path PATH            TOML configuration file
  --control-socket ENDPOINT     server registration endpoint
  --command-socket ENDPOINT     server command endpoint
  --client-socket ENDPOINT      endpoint bound for results
  --client-advertise ENDPOINT   endpoint the server dials back
  --log-filter FILTER           tracing filter expression
  --log-format FORMAT           json or compact
  --request-timeout-secs N      reply timeout, 0 waits forever
Each flag also reads ASSETLIB_<NAME> from the environment.";

/// Command-line interface for submitting commands to the asset library
/// server.
#[derive(Parser, Debug)]
#[command(
    name = "assetlib",
    disable_help_subcommand = true,
    version,
    after_help = CONFIG_HELP
)]
pub(crate) struct Cli {
    /// What to do; defaults to the interactive shell.
    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

/// Client operations.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Reads commands from standard input and prints results as they arrive.
    Shell,
    /// Imports one asset into the host.
    Import {
        /// File to import.
        path: PathBuf,
        /// Waits for the import result before exiting.
        #[arg(long)]
        wait: bool,
    },
    /// Submits one command by name.
    Exec {
        /// Command name (for example `sleep`).
        name: String,
        /// Positional arguments passed to the command.
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        args: Vec<String>,
        /// Holds the acknowledgement until every queued command has run.
        #[arg(long)]
        blocking: bool,
        /// Waits for the command result before exiting.
        #[arg(long)]
        wait: bool,
    },
    /// Lists the clients registered with the server.
    Clients,
}
