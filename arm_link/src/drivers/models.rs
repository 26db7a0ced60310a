use std::fmt;

use serde::{Deserialize, Serialize};

use crate::packets::ControllerReply;
use crate::LinkError;

#[derive(Serialize, Deserialize, Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Posted by the connection's I/O task, consumed by whoever owns the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Message(String),
    Error(LinkError),
    Closed,
}

impl ConnectionEvent {
    /// Inbound text read as a controller reply, when it is one.
    pub fn reply(&self) -> Option<ControllerReply> {
        match self {
            ConnectionEvent::Message(text) => text.parse().ok(),
            _ => None,
        }
    }
}
