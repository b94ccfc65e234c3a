//! Snapshots and the snapshot buffer
//!
//! The host sends its state as an opaque JSON body. The body is kept as
//! received and decoded only when a tick needs it, so a malformed snapshot
//! costs one skipped tick rather than a dropped message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::{Score, ServerMessage};

/// 2D position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation between `self` and `other`.
    pub fn lerp(self, other: Vec2, t: f64) -> Vec2 {
        Vec2 {
            x: lerp(self.x, other.x, t),
            y: lerp(self.y, other.y, t),
        }
    }
}

pub(crate) fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Paddle positions as the host sees them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaddlePositions {
    /// The host's own paddle.
    #[serde(rename = "self")]
    pub own: f64,
    pub opponent: f64,
}

/// Decoded body of a `game-state` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub balls: Vec<Vec2>,
    pub paddles: PaddlePositions,
    pub score: Score,
}

/// One timestamped host sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Host production time (ms since epoch).
    pub timestamp: u64,
    pub state: Value,
}

impl Snapshot {
    pub fn new(timestamp: u64, state: Value) -> Self {
        Self { timestamp, state }
    }

    /// Snapshot carried by a relayed `game-state`, if that's what this is.
    pub fn from_message(message: &ServerMessage) -> Option<Self> {
        match message {
            ServerMessage::GameState { state, timestamp } => Some(Self::new(*timestamp, state.clone())),
            _ => None,
        }
    }

    /// Decode the body. `None` if any required field is missing or mistyped.
    pub fn decode(&self) -> Option<SnapshotState> {
        SnapshotState::deserialize(&self.state).ok()
    }
}

/// What the peer should draw this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub balls: Vec<Vec2>,
    /// The host's paddle, drawn as the peer's opponent.
    pub opponent_paddle_y: f64,
    pub score: Score,
    /// Time the values were sampled at.
    pub render_time: u64,
}

/// Snapshots ordered by timestamp, capped in size.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    entries: Vec<Snapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert in timestamp order, evicting the oldest beyond capacity.
    pub fn push(&mut self, snapshot: Snapshot) {
        let idx = self
            .entries
            .partition_point(|s| s.timestamp <= snapshot.timestamp);
        self.entries.insert(idx, snapshot);

        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.capacity;
            self.entries.drain(..excess);
        }
    }

    /// First adjacent pair with `s0.timestamp <= render_time <= s1.timestamp`.
    pub fn bracket(&self, render_time: u64) -> Option<(&Snapshot, &Snapshot)> {
        self.entries
            .windows(2)
            .find(|pair| pair[0].timestamp <= render_time && render_time <= pair[1].timestamp)
            .map(|pair| (&pair[0], &pair[1]))
    }

    /// Drop snapshots stamped before `cutoff`.
    pub fn prune_before(&mut self, cutoff: u64) {
        self.entries.retain(|s| s.timestamp >= cutoff);
    }

    pub fn timestamps(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|s| s.timestamp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
