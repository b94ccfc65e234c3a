//! Connection Endpoints
//!
//! One entry per open WebSocket: its identity, liveness flag and the
//! outbound queue drained by the connection's writer task. Outbound queues
//! are unbounded; a slow reader is only ever caught by the liveness monitor.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};

use crate::core::ConnectionId;
use crate::network::protocol::ServerMessage;

/// Work item for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialize and send as a text frame.
    Message(ServerMessage),
    /// Send a WebSocket ping frame.
    Probe,
    /// Drop the connection without a close handshake.
    Terminate,
}

/// A connected client as seen by the server.
#[derive(Debug)]
pub struct Endpoint {
    /// Connection identity.
    pub id: ConnectionId,
    /// Remote address.
    pub addr: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: Instant,
    alive: AtomicBool,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Endpoint {
    /// Queue a message. Returns false if the writer is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(Outbound::Message(message)).is_ok()
    }

    /// Record a probe answer.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Whether the last probe has been answered.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Clear the liveness flag and return its previous value.
    pub(crate) fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Queue a liveness probe.
    pub(crate) fn probe(&self) -> bool {
        self.outbound.send(Outbound::Probe).is_ok()
    }

    /// Ask the writer to drop the connection.
    pub(crate) fn terminate(&self) -> bool {
        self.outbound.send(Outbound::Terminate).is_ok()
    }
}

/// All open endpoints keyed by identity.
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<ConnectionId, Arc<Endpoint>>>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Returns the endpoint and the receiving end of its outbound queue.
    pub async fn register(
        &self,
        id: ConnectionId,
        addr: SocketAddr,
    ) -> (Arc<Endpoint>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(Endpoint {
            id,
            addr,
            connected_at: Instant::now(),
            alive: AtomicBool::new(true),
            outbound,
        });

        self.endpoints.write().await.insert(id, endpoint.clone());
        (endpoint, outbound_rx)
    }

    /// Forget a connection.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Arc<Endpoint>> {
        self.endpoints.write().await.remove(&id)
    }

    /// Look up a connection.
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Endpoint>> {
        self.endpoints.read().await.get(&id).cloned()
    }

    /// Fire-and-forget delivery to one connection.
    pub async fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.get(id).await {
            Some(endpoint) => endpoint.send(message),
            None => false,
        }
    }

    /// Fire-and-forget delivery to several connections.
    pub async fn send_all(&self, ids: &[ConnectionId], message: &ServerMessage) {
        let endpoints = self.endpoints.read().await;
        for id in ids {
            if let Some(endpoint) = endpoints.get(id) {
                endpoint.send(message.clone());
            }
        }
    }

    /// Every open endpoint.
    pub async fn all(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.read().await.values().cloned().collect()
    }

    /// Number of open endpoints.
    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    /// Whether no endpoint is open.
    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    #[tokio::test]
    async fn test_register_and_send() {
        let registry = EndpointRegistry::new();
        let id = ConnectionId::from_raw(1);
        let (endpoint, mut rx) = registry.register(id, addr()).await;

        assert!(endpoint.is_alive());
        assert!(registry.send_to(id, ServerMessage::Pong { timestamp: 7 }).await);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Message(ServerMessage::Pong { timestamp: 7 }));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_send_to_unknown_or_closed() {
        let registry = EndpointRegistry::new();
        assert!(!registry.send_to(ConnectionId::from_raw(5), ServerMessage::Pong { timestamp: 0 }).await);

        let id = ConnectionId::from_raw(6);
        let (_endpoint, rx) = registry.register(id, addr()).await;
        drop(rx);
        assert!(!registry.send_to(id, ServerMessage::Pong { timestamp: 0 }).await);
    }

    #[tokio::test]
    async fn test_send_all_skips_missing() {
        let registry = EndpointRegistry::new();
        let a = ConnectionId::from_raw(1);
        let b = ConnectionId::from_raw(2);
        let (_ea, mut rx_a) = registry.register(a, addr()).await;

        let msg = ServerMessage::error("x");
        registry.send_all(&[a, b], &msg).await;
        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Message(msg));
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = EndpointRegistry::new();
        let id = ConnectionId::from_raw(3);
        let _ = registry.register(id, addr()).await;

        assert!(registry.unregister(id).await.is_some());
        assert!(registry.get(id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_liveness_flag() {
        let registry = EndpointRegistry::new();
        let (endpoint, _rx) = registry.register(ConnectionId::from_raw(4), addr()).await;

        assert!(endpoint.take_alive());
        assert!(!endpoint.is_alive());
        assert!(!endpoint.take_alive());
        endpoint.mark_alive();
        assert!(endpoint.is_alive());
    }
}
