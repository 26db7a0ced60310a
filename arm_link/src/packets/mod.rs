mod command;
mod reply;

pub use command::*;
pub use reply::*;

use crate::LinkError;

/// Anything that can put a [`Command`] on the wire.
///
/// The connection manager is the production sink; the mode controller only ever
/// talks to this trait so it can be driven without a live connection.
pub trait CommandSink {
    fn submit(&self, command: &Command) -> Result<(), LinkError>;
}
