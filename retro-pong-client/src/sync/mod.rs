//! Snapshot synchronization
//!
//! Host side produces snapshots through a [`SnapshotSource`]; the peer
//! buffers them and feeds interpolated [`RenderState`]s to a
//! [`PeerSimulation`]. Physics and drawing live behind those two traits.

mod interpolation;
mod snapshot;

pub use interpolation::*;
pub use snapshot::*;

/// The host's simulation, read once per outgoing snapshot.
pub trait SnapshotSource {
    fn produce_snapshot(&mut self) -> SnapshotState;
}

/// The peer's simulation, written once per rendered tick.
pub trait PeerSimulation {
    fn apply_render_state(&mut self, state: &RenderState);
}
