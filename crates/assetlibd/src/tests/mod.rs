//! Test suites for the command dispatch server.

mod dispatch_behaviour;
pub(crate) mod support;
