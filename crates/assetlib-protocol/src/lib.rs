//! Wire protocol shared by the asset library server and its clients.
//!
//! The protocol moves [`Message`] mappings between processes as JSON Lines.
//! A client turns a user action into a [`Command`], serialises it with
//! [`Command::to_message`], and the server rebuilds it through a
//! [`CommandRegistry`] before binding a [`Receiver`] and executing it.
//!
//! ```json
//! {"command":"import","args":["/assets/hero/v003/hero.obj"],"id":"tcp://127.0.0.1:6002"}
//! {"status":"ok","info":"queued"}
//! {"status":"ok","result":{"imported":"/assets/hero/v003/hero.obj"}}
//! ```
//!
//! Commands never carry their receiver across the wire: the receiver is
//! attached on the server side when a command is bound for execution.

mod codec;
mod command;
mod error;
mod message;
mod receiver;
mod registry;

pub use codec::{
    CodecError, MAX_MESSAGE_BYTES, decode, encode, read_frame, read_message, write_message,
};
pub use command::{Action, ArgumentReader, BLOCKING_KEY, BoundCommand, Command, MAX_SLEEP};
pub use error::CommandError;
pub use message::{KeywordArguments, Message, Notification, Status};
pub use receiver::{Receiver, ReceiverError};
pub use registry::{ActionParser, CommandRegistry, CommandSpec, canonical_name};

#[cfg(test)]
pub(crate) use receiver::MockReceiver;
