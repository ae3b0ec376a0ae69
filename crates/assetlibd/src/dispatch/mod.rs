//! Request handlers bound to the control and command endpoints.

mod commands;
mod control;

pub(crate) use commands::CommandHandler;
pub(crate) use control::ControlHandler;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

fn not_registered(id: Option<&str>) -> String {
    format!(
        "{} not registered, try reconnecting..",
        id.unwrap_or("client")
    )
}
