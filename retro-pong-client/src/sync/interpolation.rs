//! Snapshot interpolation
//!
//! The non-host peer renders a fixed delay behind real time. Each tick it
//! finds the two snapshots bracketing `now - delay`, blends ball and paddle
//! positions between them, and takes the score from the later one. Ticks
//! with no bracketing pair, or with an undecodable snapshot, keep the last
//! rendered state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

use super::snapshot::{lerp, RenderState, Snapshot, SnapshotBuffer, SnapshotState, Vec2};
use super::PeerSimulation;
use crate::network::unix_millis;

/// Synchronizer tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How far behind real time the peer renders.
    pub interpolation_delay: Duration,
    /// Maximum buffered snapshots.
    pub buffer_capacity: usize,
    /// Snapshots older than `render_time - retention` are pruned.
    pub retention: Duration,
    /// Period of the render tick.
    pub tick_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interpolation_delay: Duration::from_millis(100),
            buffer_capacity: 10,
            retention: Duration::from_millis(1000),
            tick_interval: Duration::from_millis(16),
        }
    }
}

/// Buffers host snapshots and produces the peer's render state.
#[derive(Debug)]
pub struct Synchronizer {
    config: SyncConfig,
    buffer: SnapshotBuffer,
    last: Option<RenderState>,
}

impl Synchronizer {
    pub fn new(config: SyncConfig) -> Self {
        let buffer = SnapshotBuffer::new(config.buffer_capacity);
        Self {
            config,
            buffer,
            last: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.buffer.push(snapshot);
    }

    /// Last successfully rendered state.
    pub fn render_state(&self) -> Option<&RenderState> {
        self.last.as_ref()
    }

    /// Advance to wall time `now` (ms). Returns the new state when this
    /// tick produced one.
    pub fn tick(&mut self, now: u64) -> Option<&RenderState> {
        let render_time = now.saturating_sub(self.config.interpolation_delay.as_millis() as u64);

        let (s0, s1) = self.buffer.bracket(render_time)?;
        let span = s1.timestamp - s0.timestamp;
        let t = if span == 0 {
            1.0
        } else {
            (render_time - s0.timestamp) as f64 / span as f64
        };

        let (Some(from), Some(to)) = (s0.decode(), s1.decode()) else {
            debug!("Skipping tick: malformed snapshot near {}", render_time);
            return None;
        };

        let state = blend(&from, &to, t, render_time);
        trace!("Rendered t={:.3} at {}", t, render_time);

        let retention = self.config.retention.as_millis() as u64;
        self.buffer.prune_before(render_time.saturating_sub(retention));
        self.last = Some(state);
        self.last.as_ref()
    }

    /// Run on a timer until the snapshot channel closes, handing every new
    /// render state to `sim`.
    pub fn spawn<P>(mut self, mut snapshots: mpsc::UnboundedReceiver<Snapshot>, mut sim: P) -> JoinHandle<()>
    where
        P: PeerSimulation + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    snapshot = snapshots.recv() => {
                        match snapshot {
                            Some(snapshot) => self.push(snapshot),
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        if let Some(state) = self.tick(unix_millis()) {
                            sim.apply_render_state(state);
                        }
                    }
                }
            }
            debug!("Snapshot channel closed, synchronizer stopped");
        })
    }
}

/// Interpolate the common ball prefix; extra balls in `to` are taken as is.
fn blend(from: &SnapshotState, to: &SnapshotState, t: f64, render_time: u64) -> RenderState {
    let balls = to
        .balls
        .iter()
        .enumerate()
        .map(|(i, end)| match from.balls.get(i) {
            Some(start) => start.lerp(*end, t),
            None => *end,
        })
        .collect::<Vec<Vec2>>();

    RenderState {
        balls,
        opponent_paddle_y: lerp(from.paddles.own, to.paddles.own, t),
        score: to.score,
        render_time,
    }
}
