//! WebSocket client for connecting to game server
//!
//! A [`ClientLink`] owns one background driver task per connection. The
//! driver reads frames, writes queued messages, sends latency pings and,
//! when the connection drops while a room is active, reconnects with
//! linear backoff. Everything the caller needs to react to arrives on the
//! [`LinkEvent`] channel returned by [`ClientLink::new`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::input::InputGate;
use super::messages::{unix_millis, ClientMessage, GameMode, Score, ServerMessage};
use super::reconnect::ReconnectPolicy;
use crate::sync::{SnapshotSource, SnapshotState};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `disconnect` waits for the driver to close cleanly.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Error text the server sends to members of an evicted lobby.
const ROOM_EXPIRED: &str = "Room expired";

/// Link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// WebSocket URL of the server.
    pub server_url: String,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Attempt `n` waits `n * reconnect_base_delay`.
    pub reconnect_base_delay: Duration,
    /// Period of latency pings.
    pub ping_interval: Duration,
}

impl LinkConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3000".to_string(),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(2),
            ping_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Not connected to server")]
    NotConnected,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Only the host can do that")]
    NotHost,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Something the caller should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A connection (first or re-established) is open.
    Connected,
    /// A server message passed local filtering.
    Message(ServerMessage),
    /// The connection dropped; another attempt follows after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The connection closed.
    Disconnected,
    /// Reconnection gave up. The room context has been discarded.
    Failed { attempts: u32 },
}

/// What the client knows about its room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomContext {
    pub room_code: Option<String>,
    pub player_id: Option<String>,
    pub is_host: bool,
}

#[derive(Debug, Default)]
struct LinkState {
    connected: bool,
    room: RoomContext,
    latency: Option<Duration>,
    inputs: InputGate,
}

impl LinkState {
    fn enter_room(&mut self, room_code: &str, player_id: &str, is_host: bool) {
        self.room = RoomContext {
            room_code: Some(room_code.to_string()),
            player_id: Some(player_id.to_string()),
            is_host,
        };
        self.inputs.clear();
    }

    fn leave_room(&mut self) {
        self.room = RoomContext::default();
        self.inputs.clear();
    }
}

/// State shared between the handle and its driver task.
struct Shared {
    state: Mutex<LinkState>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    fn on_open(&self) {
        self.lock().connected = true;
        self.emit(LinkEvent::Connected);
    }

    fn on_close(&self) {
        {
            let mut state = self.lock();
            state.connected = false;
            state.latency = None;
        }
        self.emit(LinkEvent::Disconnected);
    }

    fn in_room(&self) -> bool {
        self.lock().room.room_code.is_some()
    }

    /// Decode a frame and update local state. Returns the message if the
    /// caller should see it.
    fn dispatch(&self, text: &str) -> Option<ServerMessage> {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse server message: {} - {}", e, text);
                return None;
            }
        };

        let mut state = self.lock();
        match &message {
            ServerMessage::RoomCreated { room_code, player_id } => {
                info!("Created room {} as {}", room_code, player_id);
                state.enter_room(room_code, player_id, true);
            }
            ServerMessage::RoomJoined { room_code, player_id } => {
                info!("Joined room {} as {}", room_code, player_id);
                state.enter_room(room_code, player_id, false);
            }
            ServerMessage::PlayerLeft { player_id } => {
                if state.room.room_code.is_some() {
                    info!("Player {} left, taking over as host", player_id);
                    state.room.is_host = true;
                }
            }
            ServerMessage::GameState { .. } if state.room.is_host => {
                debug!("Ignoring relayed game state: we are host");
                return None;
            }
            ServerMessage::PlayerInput { player_id, timestamp, .. } => {
                if !state.inputs.accept(player_id, *timestamp) {
                    debug!("Dropping stale input from {} at {}", player_id, timestamp);
                    return None;
                }
            }
            ServerMessage::Pong { timestamp } => {
                state.latency = Some(Duration::from_millis(unix_millis().saturating_sub(*timestamp)));
            }
            ServerMessage::Error { error } if error == ROOM_EXPIRED => {
                info!("Room {:?} expired", state.room.room_code);
                state.leave_room();
            }
            ServerMessage::Error { error } => {
                warn!("Server error: {}", error);
            }
            _ => {}
        }

        Some(message)
    }
}

enum Command {
    Send(ClientMessage),
    Disconnect,
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Requested,
    Dropped,
}

/// Client handle to the game server.
pub struct ClientLink {
    config: LinkConfig,
    shared: Arc<Shared>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    driver: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ClientLink {
    /// Create an unconnected link and the receiver for its events.
    pub fn new(config: LinkConfig) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let link = Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(LinkState::default()),
                events,
            }),
            commands: Mutex::new(None),
            driver: AsyncMutex::new(None),
        };
        (link, events_rx)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Open the connection.
    ///
    /// A no-op while a connection or reconnection is already running, so
    /// concurrent calls never open two sockets.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let mut driver = self.driver.lock().await;
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Connect suppressed: link already active");
            return Ok(());
        }

        info!("Connecting to {}...", self.config.server_url);
        let (socket, _) = connect_async(self.config.server_url.as_str()).await?;
        info!("WebSocket connected!");

        let (tx, rx) = mpsc::unbounded_channel();
        *self.commands_lock() = Some(tx);
        self.shared.on_open();
        *driver = Some(tokio::spawn(drive(
            socket,
            self.shared.clone(),
            self.config.clone(),
            rx,
        )));
        Ok(())
    }

    /// Close the connection, cancel pending reconnects and forget the room.
    pub async fn disconnect(&self) {
        let mut driver = self.driver.lock().await;
        let commands = self.commands_lock().take();
        if let Some(commands) = commands {
            let _ = commands.send(Command::Disconnect);
        }

        if let Some(mut handle) = driver.take() {
            if timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        let mut state = self.shared.lock();
        state.connected = false;
        state.latency = None;
        state.leave_room();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    pub fn room(&self) -> RoomContext {
        self.shared.lock().room.clone()
    }

    pub fn is_host(&self) -> bool {
        self.shared.lock().room.is_host
    }

    /// Round-trip time of the last answered ping.
    pub fn latency(&self) -> Option<Duration> {
        self.shared.lock().latency
    }

    pub fn create_room(&self, mode: GameMode) -> Result<(), LinkError> {
        self.queue(ClientMessage::CreateRoom { mode })
    }

    pub fn join_room(&self, room_code: &str) -> Result<(), LinkError> {
        self.queue(ClientMessage::JoinRoom {
            room_code: room_code.to_string(),
        })
    }

    /// Leave the current room. Does nothing outside a room.
    pub fn leave_room(&self) -> Result<(), LinkError> {
        let room_code = {
            let mut state = self.shared.lock();
            let Some(room_code) = state.room.room_code.clone() else {
                return Ok(());
            };
            state.leave_room();
            room_code
        };
        self.queue(ClientMessage::LeaveRoom { room_code })
    }

    pub fn start_game(&self) -> Result<(), LinkError> {
        let room_code = self.host_room_code()?;
        self.queue(ClientMessage::StartGame { room_code })
    }

    pub fn send_input(&self, paddle_y: f64) -> Result<(), LinkError> {
        let room = self.room();
        let room_code = room.room_code.ok_or(LinkError::NotInRoom)?;
        self.queue(ClientMessage::input(room_code, room.player_id, paddle_y))
    }

    /// Send an authoritative snapshot. Host only; nothing is sent otherwise.
    pub fn send_state(&self, state: &SnapshotState) -> Result<(), LinkError> {
        let room_code = self.host_room_code()?;
        self.queue(ClientMessage::GameState {
            room_code,
            state: serde_json::to_value(state)?,
            timestamp: unix_millis(),
        })
    }

    /// Pull the next snapshot from the host simulation and send it.
    pub fn send_snapshot_from(&self, source: &mut dyn SnapshotSource) -> Result<(), LinkError> {
        self.host_room_code()?;
        self.send_state(&source.produce_snapshot())
    }

    pub fn send_game_over(&self, score: Score) -> Result<(), LinkError> {
        let room_code = self.host_room_code()?;
        self.queue(ClientMessage::GameOver { room_code, score })
    }

    fn host_room_code(&self) -> Result<String, LinkError> {
        let room = self.room();
        let room_code = room.room_code.ok_or(LinkError::NotInRoom)?;
        if !room.is_host {
            return Err(LinkError::NotHost);
        }
        Ok(room_code)
    }

    fn queue(&self, message: ClientMessage) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let commands = self.commands_lock();
        let sender = commands.as_ref().ok_or(LinkError::NotConnected)?;
        sender
            .send(Command::Send(message))
            .map_err(|_| LinkError::NotConnected)
    }

    fn commands_lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Command>>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// DRIVER
// =============================================================================

async fn drive(
    mut socket: Socket,
    shared: Arc<Shared>,
    config: LinkConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut policy = ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_base_delay);

    loop {
        let end = run_session(socket, &shared, &config, &mut commands).await;
        shared.on_close();

        if end == SessionEnd::Requested {
            info!("Disconnected from server");
            return;
        }
        if !shared.in_room() {
            info!("Connection lost outside a room");
            return;
        }

        socket = match reconnect(&shared, &config, &mut policy, &mut commands).await {
            Some(socket) => socket,
            None => return,
        };
    }
}

async fn run_session(
    socket: Socket,
    shared: &Shared,
    config: &LinkConfig,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(message) = shared.dispatch(&text) {
                            shared.emit(LinkEvent::Message(message));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Server closed connection");
                        return SessionEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {}", e);
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                }
            }
            command = commands.recv() => {
                match command {
                    Some(Command::Send(message)) => {
                        if let Err(e) = send(&mut sink, &message).await {
                            warn!("Failed to send message: {}", e);
                            return SessionEnd::Dropped;
                        }
                    }
                    Some(Command::Disconnect) | None => {
                        let _ = sink.close().await;
                        return SessionEnd::Requested;
                    }
                }
            }
            _ = ping.tick() => {
                if let Err(e) = send(&mut sink, &ClientMessage::ping()).await {
                    warn!("Failed to send ping: {}", e);
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}

/// Retry until connected, exhausted, or cancelled.
async fn reconnect(
    shared: &Shared,
    config: &LinkConfig,
    policy: &mut ReconnectPolicy,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Option<Socket> {
    loop {
        let Some(delay) = policy.next_delay() else {
            warn!("Giving up after {} reconnect attempts", policy.attempts());
            shared.lock().leave_room();
            shared.emit(LinkEvent::Failed {
                attempts: policy.attempts(),
            });
            return None;
        };

        let attempt = policy.attempts();
        info!(
            "Reconnecting... Attempt {}/{} in {:?}",
            attempt, config.max_reconnect_attempts, delay
        );
        shared.emit(LinkEvent::Reconnecting { attempt, delay });

        if !wait_unless_cancelled(delay, commands).await {
            debug!("Reconnect cancelled");
            return None;
        }

        match connect_async(config.server_url.as_str()).await {
            Ok((socket, _)) => {
                info!("Reconnected on attempt {}", attempt);
                policy.reset();
                shared.on_open();
                return Some(socket);
            }
            Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
        }
    }
}

/// Sleep for `delay`. Returns false if a disconnect arrives first.
async fn wait_unless_cancelled(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    let deadline = sleep(delay);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            command = commands.recv() => {
                match command {
                    Some(Command::Send(_)) => debug!("Dropping message while reconnecting"),
                    Some(Command::Disconnect) | None => return false,
                }
            }
        }
    }
}

async fn send(sink: &mut SplitSink<Socket, Message>, message: &ClientMessage) -> Result<(), LinkError> {
    let text = serde_json::to_string(message)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
