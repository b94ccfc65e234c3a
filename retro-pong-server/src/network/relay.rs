//! Message Relay
//!
//! Decodes inbound frames, checks the sender's role for the message kind,
//! then either calls into the room directory or forwards the payload to the
//! other member of the sender's room.
//!
//! | kind           | sender must be | effect                               |
//! |----------------|----------------|--------------------------------------|
//! | `create-room`  | anyone         | `room-created` to sender             |
//! | `join-room`    | anyone         | `room-joined`, peer `player-joined`  |
//! | `leave-room`   | anyone         | peer `player-left`                   |
//! | `start-game`   | host           | room `game-start`                    |
//! | `player-input` | member         | peer `player-input`                  |
//! | `game-state`   | host           | peer `game-state`                    |
//! | `game-over`    | host           | peer `game-over`, score hand-off     |
//! | `ping`         | anyone         | `pong` to sender, never forwarded    |
//!
//! Forwarding is fire-and-forget: no acknowledgement, no retry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::core::{ConnectionId, GameMode, RoomCode};
use crate::network::endpoint::EndpointRegistry;
use crate::network::protocol::{ClientMessage, ProtocolError, Score, ServerMessage};
use crate::network::scores::{ScoreSink, ScoreSubmission};
use crate::network::session::{DirectoryError, Role, RoomDirectory};

/// Error text for frames that fail to decode.
pub const INVALID_FORMAT: &str = "Invalid message format";

/// Error text sent to members of an evicted lobby.
pub const ROOM_EXPIRED: &str = "Room expired";

/// Routes client messages between the directory and room peers.
pub struct Relay {
    directory: Arc<RoomDirectory>,
    endpoints: Arc<EndpointRegistry>,
    scores: Arc<dyn ScoreSink>,
}

impl Relay {
    /// Create a relay over shared directory and endpoint state.
    pub fn new(
        directory: Arc<RoomDirectory>,
        endpoints: Arc<EndpointRegistry>,
        scores: Arc<dyn ScoreSink>,
    ) -> Self {
        Self {
            directory,
            endpoints,
            scores,
        }
    }

    /// Room directory.
    pub fn directory(&self) -> &Arc<RoomDirectory> {
        &self.directory
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames get an error reply; unknown types are only logged.
    /// Neither changes any state.
    pub async fn handle_text(&self, sender: ConnectionId, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(message) => self.handle(sender, message).await,
            Err(ProtocolError::UnknownType(kind)) => {
                debug!("Unknown message type from {}: {}", sender, kind);
            }
            Err(e) => {
                debug!("Invalid message from {}: {}", sender, e);
                self.reply(sender, ServerMessage::error(INVALID_FORMAT)).await;
            }
        }
    }

    /// Handle one decoded message.
    pub async fn handle(&self, sender: ConnectionId, message: ClientMessage) {
        let kind = message.kind();
        let result = match message {
            ClientMessage::CreateRoom { mode } => self.create_room(sender, mode).await,
            ClientMessage::JoinRoom { room_code } => self.join_room(sender, &room_code).await,
            ClientMessage::LeaveRoom { .. } => {
                self.leave(sender).await;
                Ok(())
            }
            ClientMessage::StartGame { room_code } => self.start_game(sender, &room_code).await,
            ClientMessage::PlayerInput {
                room_code,
                paddle_y,
                timestamp,
                ..
            } => self.forward_input(sender, &room_code, paddle_y, timestamp).await,
            ClientMessage::GameState {
                room_code,
                state,
                timestamp,
            } => self.forward_state(sender, &room_code, state, timestamp).await,
            ClientMessage::GameOver { room_code, score } => {
                self.finish(sender, &room_code, score).await
            }
            ClientMessage::Ping { timestamp } => {
                self.reply(sender, ServerMessage::Pong { timestamp }).await;
                Ok(())
            }
        };

        if let Err(error) = result {
            debug!("Rejected {} from {}: {}", kind, sender, error);
            self.reply(sender, ServerMessage::error(error)).await;
        }
    }

    /// Clean up after a dropped connection: leave its room and tell the peer.
    pub async fn disconnect(&self, id: ConnectionId) {
        if let Some(code) = self.leave(id).await {
            info!("Client {} dropped out of room {}", id, code);
        }
    }

    /// Remove lobbies that waited longer than `max_age` for a second player.
    ///
    /// Returns the number of rooms evicted.
    pub async fn evict_stale_rooms(&self, max_age: Duration) -> usize {
        let evicted = self.directory.evict_stale(max_age).await;
        for (code, members) in &evicted {
            info!("Room {} expired in lobby", code);
            self.endpoints
                .send_all(members, &ServerMessage::error(ROOM_EXPIRED))
                .await;
        }
        evicted.len()
    }

    // =========================================================================
    // HANDLERS
    // =========================================================================

    async fn create_room(&self, sender: ConnectionId, mode: GameMode) -> Result<(), DirectoryError> {
        let room_code = self.directory.create_room(sender, mode).await?;
        info!("Room created: {} ({}) by {}", room_code, mode, sender);

        self.reply(
            sender,
            ServerMessage::RoomCreated {
                room_code,
                player_id: sender,
            },
        )
        .await;
        Ok(())
    }

    async fn join_room(&self, sender: ConnectionId, raw_code: &str) -> Result<(), DirectoryError> {
        let room_code = parse_code(raw_code)?;
        let existing = self.directory.join_room(&room_code, sender).await?;
        info!("Player {} joined room {}", sender, room_code);

        self.reply(
            sender,
            ServerMessage::RoomJoined {
                room_code,
                player_id: sender,
            },
        )
        .await;
        self.endpoints
            .send_all(&existing, &ServerMessage::PlayerJoined { player_id: sender })
            .await;
        Ok(())
    }

    async fn leave(&self, sender: ConnectionId) -> Option<RoomCode> {
        let departure = self.directory.leave(sender).await?;

        if departure.closed {
            info!("Room {} deleted (empty)", departure.code);
        } else if let Some(host) = departure.new_host {
            info!("Room {} host moved to {}", departure.code, host);
        }

        self.endpoints
            .send_all(&departure.remaining, &ServerMessage::PlayerLeft { player_id: sender })
            .await;
        Some(departure.code)
    }

    async fn start_game(&self, sender: ConnectionId, raw_code: &str) -> Result<(), DirectoryError> {
        let room_code = parse_code(raw_code)?;
        let started = self.directory.start_game(&room_code, sender).await?;
        info!("Game started in room {}", room_code);

        self.endpoints
            .send_all(&started.members, &ServerMessage::GameStart { mode: started.mode })
            .await;
        Ok(())
    }

    async fn forward_input(
        &self,
        sender: ConnectionId,
        raw_code: &str,
        paddle_y: f64,
        timestamp: u64,
    ) -> Result<(), DirectoryError> {
        let room_code = parse_code(raw_code)?;
        let route = self.directory.route(&room_code, sender, Role::Member).await?;

        self.endpoints
            .send_all(
                &route.peers,
                &ServerMessage::PlayerInput {
                    player_id: sender,
                    paddle_y,
                    timestamp,
                },
            )
            .await;
        Ok(())
    }

    async fn forward_state(
        &self,
        sender: ConnectionId,
        raw_code: &str,
        state: Value,
        timestamp: u64,
    ) -> Result<(), DirectoryError> {
        let room_code = parse_code(raw_code)?;
        let route = self.directory.route(&room_code, sender, Role::Host).await?;

        self.endpoints
            .send_all(&route.peers, &ServerMessage::GameState { state, timestamp })
            .await;
        Ok(())
    }

    async fn finish(&self, sender: ConnectionId, raw_code: &str, score: Score) -> Result<(), DirectoryError> {
        let room_code = parse_code(raw_code)?;
        let route = self.directory.route(&room_code, sender, Role::Host).await?;
        info!("Game over in room {}: {}-{}", room_code, score.p1, score.p2);

        self.endpoints
            .send_all(&route.peers, &ServerMessage::GameOver { score })
            .await;

        if route.mode.has_leaderboard() {
            self.scores
                .submit_final_score(ScoreSubmission::new(route.code, route.mode, score));
        }
        Ok(())
    }

    async fn reply(&self, to: ConnectionId, message: ServerMessage) {
        if !self.endpoints.send_to(to, message).await {
            debug!("Reply to {} dropped: connection gone", to);
        }
    }
}

fn parse_code(raw: &str) -> Result<RoomCode, DirectoryError> {
    RoomCode::parse(raw).ok_or(DirectoryError::InvalidRoomCode)
}
