//! Network module - WebSocket connection to game server

mod client;
mod input;
mod messages;
mod reconnect;

pub use client::*;
pub use input::*;
pub use messages::*;
pub use reconnect::*;
