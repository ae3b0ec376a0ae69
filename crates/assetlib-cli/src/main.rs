//! CLI entrypoint for the asset library.
//!
//! The binary delegates to [`assetlib_cli::run`], which parses arguments,
//! loads configuration, installs logging, and talks to the command server.

use std::io::{self, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let stdin = io::stdin().lock();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    // Unlocked so log events from background threads are not held up.
    let mut stderr = io::stderr();
    assetlib_cli::run(std::env::args_os(), stdin, &mut stdout, &mut stderr)
}
