use std::error::Error;
use std::fmt;

use crate::drivers::ConnectionState;
use crate::mode::Mode;
use crate::packets::CommandKind;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// `send` was attempted while the connection was not `Connected`.
    NotConnected,
    Transport(String),
    CaptureUnavailable(String),
    InvalidCommandArity {
        kind: CommandKind,
        expected: usize,
        actual: usize,
    },
    UnknownCommandKind(String),
    MalformedParam(String),
    NotPermitted {
        kind: CommandKind,
        mode: Mode,
    },
    QueueFull,
    InvalidState(ConnectionState),
    Config(String),
}

impl Error for LinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LinkError::NotConnected => write!(f, "Not connected to the robot controller"),
            LinkError::Transport(ref msg) => write!(f, "Transport error: {}", msg),
            LinkError::CaptureUnavailable(ref msg) => write!(f, "Capture unavailable: {}", msg),
            LinkError::InvalidCommandArity { kind, expected, actual } => write!(
                f,
                "Command {} expects {} parameter(s), got {}",
                kind, expected, actual
            ),
            LinkError::UnknownCommandKind(ref tag) => write!(f, "Unknown command kind tag: {:?}", tag),
            LinkError::MalformedParam(ref field) => write!(f, "Malformed parameter: {:?}", field),
            LinkError::NotPermitted { kind, mode } => {
                write!(f, "Command {} is not permitted while {}", kind, mode)
            }
            LinkError::QueueFull => write!(f, "Outbound queue is full"),
            LinkError::InvalidState(state) => write!(f, "Operation not valid while {}", state),
            LinkError::Config(ref msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl From<figment::Error> for LinkError {
    fn from(e: figment::Error) -> Self {
        LinkError::Config(e.to_string())
    }
}
