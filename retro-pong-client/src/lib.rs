//! Retro Pong online client
//!
//! Two halves:
//! - [`network`]: the [`ClientLink`] to the relay server, with reconnection,
//!   latency pings and stale-input filtering.
//! - [`sync`]: the peer-side [`Synchronizer`] that turns delayed host
//!   snapshots into smooth render state.
//!
//! Typical peer wiring: forward every `LinkEvent::Message` that
//! [`Snapshot::from_message`] accepts into the synchronizer's channel.

pub mod network;
pub mod sync;

pub use network::{ClientLink, GameMode, LinkConfig, LinkError, LinkEvent, ServerMessage};
pub use sync::{PeerSimulation, RenderState, Snapshot, SnapshotSource, SnapshotState, SyncConfig, Synchronizer};
