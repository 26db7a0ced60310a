use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the controller listens and how the link to it is buffered.
///
/// ```rust
/// use arm_link::drivers::ConnectionConfig;
///
/// let config = ConnectionConfig::new("localhost:8765".to_string(), 30, 5000);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.connection_url(), "ws://localhost:8765");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub address: String,
    /// Capacity of the outbound queue between callers and the I/O task.
    pub max_messages: usize,
    /// How long `Connecting` may last before the attempt is abandoned.
    pub connect_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn new(address: String, max_messages: usize, connect_timeout_ms: u64) -> Self {
        Self {
            address,
            max_messages,
            connect_timeout_ms,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("Address cannot be empty.".to_string());
        }
        if self.max_messages == 0 {
            return Err("Maximum messages must be greater than 0.".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return Err("Connect timeout must be greater than 0.".to_string());
        }
        Ok(())
    }

    /// The address as a WebSocket URL, adding `ws://` when no scheme is given.
    pub fn connection_url(&self) -> String {
        websocket_url(&self.address)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// `address` as a WebSocket URL. Bare `host:port` addresses get `ws://`.
pub fn websocket_url(address: &str) -> String {
    let address = address.trim();
    if address.starts_with("ws://") || address.starts_with("wss://") {
        address.to_string()
    } else {
        format!("ws://{}", address)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8765".to_string(),
            max_messages: 30,
            connect_timeout_ms: 5000,
        }
    }
}
