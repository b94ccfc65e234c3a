//! Liveness Monitor
//!
//! A single timer probes every endpoint with a WebSocket ping. An endpoint
//! that has not answered the previous probe by the next sweep is terminated,
//! which runs the normal disconnect path (directory cleanup, `player-left`).
//! A silently dead peer is therefore detected within about two intervals.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::network::endpoint::EndpointRegistry;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Endpoints sent a fresh probe.
    pub probed: usize,
    /// Endpoints terminated for missing the previous probe.
    pub terminated: usize,
}

/// Periodic prober over an [`EndpointRegistry`].
pub struct LivenessMonitor {
    endpoints: Arc<EndpointRegistry>,
    period: Duration,
}

impl LivenessMonitor {
    /// Monitor `endpoints` every `period`.
    pub fn new(endpoints: Arc<EndpointRegistry>, period: Duration) -> Self {
        Self { endpoints, period }
    }

    /// Probe interval.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one probe round.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for endpoint in self.endpoints.all().await {
            if endpoint.take_alive() {
                endpoint.probe();
                report.probed += 1;
            } else {
                info!("Terminating unresponsive connection {} ({})", endpoint.id, endpoint.addr);
                endpoint.terminate();
                report.terminated += 1;
            }
        }

        report
    }

    /// Sweep every period until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so new connections
        // get a full period before their first probe.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    debug!(probed = report.probed, terminated = report.terminated, "liveness sweep");
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConnectionId;
    use crate::network::endpoint::Outbound;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4001))
    }

    #[tokio::test]
    async fn test_first_sweep_probes() {
        let registry = Arc::new(EndpointRegistry::new());
        let (_endpoint, mut rx) = registry.register(ConnectionId::from_raw(1), addr()).await;
        let monitor = LivenessMonitor::new(registry, Duration::from_secs(30));

        let report = monitor.sweep().await;
        assert_eq!(report, SweepReport { probed: 1, terminated: 0 });
        assert_eq!(rx.try_recv().unwrap(), Outbound::Probe);
    }

    #[tokio::test]
    async fn test_unanswered_probe_terminates() {
        let registry = Arc::new(EndpointRegistry::new());
        let (_endpoint, mut rx) = registry.register(ConnectionId::from_raw(1), addr()).await;
        let monitor = LivenessMonitor::new(registry, Duration::from_secs(30));

        monitor.sweep().await;
        let report = monitor.sweep().await;

        assert_eq!(report, SweepReport { probed: 0, terminated: 1 });
        assert_eq!(rx.try_recv().unwrap(), Outbound::Probe);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Terminate);
    }

    #[tokio::test]
    async fn test_answered_probe_keeps_connection() {
        let registry = Arc::new(EndpointRegistry::new());
        let (endpoint, mut rx) = registry.register(ConnectionId::from_raw(1), addr()).await;
        let monitor = LivenessMonitor::new(registry, Duration::from_secs(30));

        for _ in 0..3 {
            monitor.sweep().await;
            endpoint.mark_alive();
        }

        let mut probes = 0;
        while let Ok(item) = rx.try_recv() {
            assert_eq!(item, Outbound::Probe);
            probes += 1;
        }
        assert_eq!(probes, 3);
    }

    #[tokio::test]
    async fn test_sweep_handles_mixed_endpoints() {
        let registry = Arc::new(EndpointRegistry::new());
        let (healthy, _rx_a) = registry.register(ConnectionId::from_raw(1), addr()).await;
        let (_silent, _rx_b) = registry.register(ConnectionId::from_raw(2), addr()).await;
        let monitor = LivenessMonitor::new(registry, Duration::from_secs(30));

        monitor.sweep().await;
        healthy.mark_alive();
        let report = monitor.sweep().await;

        assert_eq!(report, SweepReport { probed: 1, terminated: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let registry = Arc::new(EndpointRegistry::new());
        let (_endpoint, mut rx) = registry.register(ConnectionId::from_raw(1), addr()).await;
        let monitor = LivenessMonitor::new(registry, Duration::from_secs(30));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(monitor.run(shutdown_rx));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(rx.recv().await, Some(Outbound::Probe));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
