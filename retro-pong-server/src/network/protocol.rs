//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a UTF-8 JSON object with a mandatory `type` field;
//! type names are kebab-case and field names camelCase.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::{ConnectionId, GameMode, RoomCode};

/// Largest accepted `paddleY` magnitude, in canvas pixels.
pub const MAX_PADDLE_Y: f64 = 10_000.0;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Open a new room with the sender as host.
    CreateRoom {
        /// Requested mode; classic when omitted or null.
        #[serde(default, deserialize_with = "mode_or_classic")]
        mode: GameMode,
    },

    /// Join an existing room by code.
    JoinRoom {
        /// Code as typed by the player (normalized server side).
        room_code: String,
    },

    /// Leave the current room.
    LeaveRoom {
        /// Room the client believes it is in. Informational only.
        #[serde(default)]
        room_code: Option<String>,
    },

    /// Host starts the match.
    StartGame {
        /// Room to start.
        room_code: String,
    },

    /// Paddle position from either player.
    PlayerInput {
        /// Room the input belongs to.
        room_code: String,
        /// Client's idea of its own id. Ignored; the server stamps the sender.
        #[serde(default)]
        player_id: Option<String>,
        /// Paddle Y coordinate.
        paddle_y: f64,
        /// Client timestamp (ms since epoch).
        timestamp: u64,
    },

    /// Authoritative snapshot from the host.
    GameState {
        /// Room the snapshot belongs to.
        room_code: String,
        /// Opaque snapshot body; relayed untouched.
        state: Value,
        /// Host timestamp at production (ms since epoch).
        timestamp: u64,
    },

    /// Host reports the final score.
    GameOver {
        /// Room that finished.
        room_code: String,
        /// Final score.
        score: Score,
    },

    /// Latency probe.
    Ping {
        /// Client timestamp, echoed back in `pong`.
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Every `type` value the server understands.
    pub const KINDS: [&'static str; 8] = [
        "create-room",
        "join-room",
        "leave-room",
        "start-game",
        "player-input",
        "game-state",
        "game-over",
        "ping",
    ];

    /// Wire name of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom { .. } => "create-room",
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::LeaveRoom { .. } => "leave-room",
            ClientMessage::StartGame { .. } => "start-game",
            ClientMessage::PlayerInput { .. } => "player-input",
            ClientMessage::GameState { .. } => "game-state",
            ClientMessage::GameOver { .. } => "game-over",
            ClientMessage::Ping { .. } => "ping",
        }
    }

    /// Decode a text frame.
    ///
    /// Unknown `type` values are reported separately from malformed frames
    /// so the caller can log them without replying.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        if !Self::KINDS.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        let kind = kind.to_string();
        let message: ClientMessage = serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidFields { kind, source })?;

        if let ClientMessage::PlayerInput { paddle_y, .. } = &message {
            if paddle_y.abs() > MAX_PADDLE_Y {
                return Err(ProtocolError::OutOfBounds("paddleY"));
            }
        }

        Ok(message)
    }
}

fn mode_or_classic<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GameMode, D::Error> {
    Ok(Option::<GameMode>::deserialize(deserializer)?.unwrap_or_default())
}

/// Two-player score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Left player.
    pub p1: u32,
    /// Right player.
    pub p2: u32,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Room opened; the recipient is its host.
    RoomCreated {
        /// Code to share with the opponent.
        room_code: RoomCode,
        /// Recipient's identity.
        player_id: ConnectionId,
    },

    /// Recipient joined a room.
    RoomJoined {
        /// Joined room.
        room_code: RoomCode,
        /// Recipient's identity.
        player_id: ConnectionId,
    },

    /// An opponent joined the recipient's room.
    PlayerJoined {
        /// Joining player.
        player_id: ConnectionId,
    },

    /// The opponent left or dropped.
    PlayerLeft {
        /// Departed player.
        player_id: ConnectionId,
    },

    /// Match is starting.
    GameStart {
        /// Room mode.
        mode: GameMode,
    },

    /// Host snapshot, relayed to the peer.
    GameState {
        /// Snapshot body as the host sent it.
        state: Value,
        /// Host production timestamp.
        timestamp: u64,
    },

    /// Opponent input, relayed.
    PlayerInput {
        /// Sender identity as seen by the server.
        player_id: ConnectionId,
        /// Paddle Y coordinate.
        paddle_y: f64,
        /// Sender timestamp.
        timestamp: u64,
    },

    /// Host declared the match over.
    GameOver {
        /// Final score.
        score: Score,
    },

    /// Reply to `ping`.
    Pong {
        /// Echo of the ping timestamp.
        timestamp: u64,
    },

    /// Request rejected.
    Error {
        /// Human-readable reason.
        error: String,
    },
}

impl ServerMessage {
    /// Build an error reply.
    pub fn error(reason: impl ToString) -> Self {
        ServerMessage::Error {
            error: reason.to_string(),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failure to decode an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON at all.
    #[error("malformed JSON: {0}")]
    Malformed(serde_json::Error),

    /// JSON without a string `type`.
    #[error("missing message type")]
    MissingType,

    /// A `type` the server does not handle.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Known `type`, wrong fields.
    #[error("invalid {kind} message: {source}")]
    InvalidFields {
        /// Message type.
        kind: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },

    /// Field decoded but outside the accepted range.
    #[error("{0} out of bounds")]
    OutOfBounds(&'static str),
}
