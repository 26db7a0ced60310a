//! Control-and-communication core of the arm operator console.
//!
//! Commands are encoded as `$`-delimited text ([`packets`]), sent over one WebSocket
//! connection ([`drivers::ConnectionManager`]), gated by the operating mode
//! ([`mode::ModeController`]), while camera frames are scaled and published on their
//! own tick ([`video::VideoPipeline`]).

pub mod config;
pub mod drivers;
pub mod mode;
pub mod packets;
pub mod session;
pub mod targets;
pub mod video;

pub mod errors;
pub use errors::*;
