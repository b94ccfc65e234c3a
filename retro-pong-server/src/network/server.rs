//! WebSocket Game Server
//!
//! Async WebSocket server for Retro Pong rooms.
//! Accepts connections, hands text frames to the [`Relay`], and runs the
//! liveness monitor and lobby cleanup in the background.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::ConnectionId;
use crate::network::endpoint::{EndpointRegistry, Outbound};
use crate::network::liveness::LivenessMonitor;
use crate::network::relay::Relay;
use crate::network::scores::{LogScoreSink, ScoreSink};
use crate::network::session::RoomDirectory;

/// Port used when neither `PORT` nor `BIND_ADDR` says otherwise.
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Period between liveness sweeps.
    pub heartbeat_interval: Duration,
    /// How long a room may wait for its second player.
    pub lobby_timeout: Duration,
    /// Period between lobby cleanup sweeps.
    pub cleanup_interval: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            heartbeat_interval: Duration::from_secs(30),
            lobby_timeout: Duration::from_secs(10 * 60),
            cleanup_interval: Duration::from_secs(60),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// `BIND_ADDR` sets the full address, `PORT` then overrides its port.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR").and_then(|v| parse_value::<SocketAddr>(&v)) {
            config.bind_addr = addr;
        }
        if let Some(port) = lookup("PORT").and_then(|v| parse_value::<u16>(&v)) {
            config.bind_addr.set_port(port);
        }
        if let Some(max) = parse("MAX_CONNECTIONS") {
            config.max_connections = max as usize;
        }
        if let Some(secs) = parse("HEARTBEAT_INTERVAL_SECS").filter(|s| *s > 0) {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse("LOBBY_TIMEOUT_SECS") {
            config.lobby_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Listener I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Room directory.
    directory: Arc<RoomDirectory>,
    /// Open connections.
    endpoints: Arc<EndpointRegistry>,
    /// Message dispatch.
    relay: Arc<Relay>,
    /// One permit per admitted connection, taken before the handshake.
    connection_slots: Arc<Semaphore>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server that logs final scores.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_score_sink(config, Arc::new(LogScoreSink))
    }

    /// Create a server handing final scores to `scores`.
    pub fn with_score_sink(config: ServerConfig, scores: Arc<dyn ScoreSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let directory = Arc::new(RoomDirectory::new());
        let endpoints = Arc::new(EndpointRegistry::new());
        let relay = Arc::new(Relay::new(directory.clone(), endpoints.clone(), scores));
        let connection_slots = Arc::new(Semaphore::new(
            config.max_connections.min(Semaphore::MAX_PERMITS),
        ));

        Self {
            config,
            directory,
            endpoints,
            relay,
            connection_slots,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GameServerError::BindFailed { addr, source })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let local_addr = listener.local_addr()?;
        info!(
            "Retro Pong server v{} listening on {}",
            self.config.version, local_addr
        );

        let monitor = LivenessMonitor::new(self.endpoints.clone(), self.config.heartbeat_interval);
        let heartbeat_handle = tokio::spawn(monitor.run(self.shutdown_tx.subscribe()));

        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(
            self.relay.clone(),
            self.config.cleanup_interval,
            self.config.lobby_timeout,
            self.shutdown_tx.subscribe(),
        ));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Ok(slot) = self.connection_slots.clone().try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr, slot);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        heartbeat_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection. `slot` is released when the
    /// connection task ends, handshake failures included.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, slot: OwnedSemaphorePermit) {
        let endpoints = self.endpoints.clone();
        let relay = self.relay.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let id = ConnectionId::next();
            let (endpoint, mut outbound_rx) = endpoints.register(id, addr).await;
            info!("Client {} connected from {}", id, addr);

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            // Writer task: drains the outbound queue until terminated.
            let mut writer = tokio::spawn(async move {
                while let Some(item) = outbound_rx.recv().await {
                    let frame = match item {
                        Outbound::Message(msg) => match msg.to_json() {
                            Ok(text) => Message::Text(text),
                            Err(e) => {
                                error!("Failed to serialize message: {}", e);
                                continue;
                            }
                        },
                        Outbound::Probe => Message::Ping(Vec::new()),
                        Outbound::Terminate => break,
                    };
                    if ws_sender.send(frame).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                relay.handle_text(id, &text).await;
                            }
                            Some(Ok(Message::Pong(_))) => {
                                endpoint.mark_alive();
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} closed the connection", id);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", id, e);
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                    _ = &mut writer => {
                        debug!("Writer for {} stopped", id);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            writer.abort();
            endpoints.unregister(id).await;
            relay.disconnect(id).await;
            info!("Client {} disconnected", id);
        });
    }

    /// Evict lobbies that outlived the lobby timeout.
    async fn run_cleanup_loop(
        relay: Arc<Relay>,
        every: Duration,
        lobby_timeout: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = relay.evict_stale_rooms(lobby_timeout).await;
                    if evicted > 0 {
                        info!("Evicted {} stale rooms", evicted);
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Room directory.
    pub fn directory(&self) -> &Arc<RoomDirectory> {
        &self.directory
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.endpoints.len().await
    }

    /// Get open room count.
    pub async fn room_count(&self) -> usize {
        self.directory.room_count().await
    }
}
