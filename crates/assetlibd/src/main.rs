//! Entrypoint for the asset library command server.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match assetlibd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            drop(writeln!(stderr, "assetlibd: {error}"));
            ExitCode::FAILURE
        }
    }
}
