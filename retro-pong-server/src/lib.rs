//! # Retro Pong Server
//!
//! Room directory and message relay for two-player online Pong.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RETRO PONG SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Identities and value types                │
//! │  ├── identity.rs - Per-connection identity                   │
//! │  ├── mode.rs     - Game modes                                │
//! │  └── room_code.rs- Six-character room codes                  │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server and config               │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Room directory                            │
//! │  ├── relay.rs    - Authority checks and forwarding           │
//! │  ├── endpoint.rs - Open connections and outbound queues      │
//! │  ├── liveness.rs - Ping/terminate heartbeat                  │
//! │  └── scores.rs   - Final score hand-off                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! The room host runs the only simulation. The server accepts `game-state`
//! and `game-over` from the host alone and relays them to the guest; inputs
//! flow both ways. Nothing is ever forwarded outside the sender's room.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod network;

// Re-export commonly used types
pub use core::{ConnectionId, GameMode, RoomCode};
pub use network::{GameServer, GameServerError, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
