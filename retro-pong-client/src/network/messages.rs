//! Protocol messages for client-server communication

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// SHARED TYPES
// =============================================================================

/// Game mode chosen when a room is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Classic,
    Arcade,
    TimeAttack,
    Chaos,
    Survival,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameMode::Classic => "classic",
            GameMode::Arcade => "arcade",
            GameMode::TimeAttack => "timeattack",
            GameMode::Chaos => "chaos",
            GameMode::Survival => "survival",
        };
        f.write_str(name)
    }
}

/// Two-player score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub p1: u32,
    pub p2: u32,
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom {
        mode: GameMode,
    },
    JoinRoom {
        room_code: String,
    },
    LeaveRoom {
        room_code: String,
    },
    StartGame {
        room_code: String,
    },
    PlayerInput {
        room_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        paddle_y: f64,
        timestamp: u64,
    },
    GameState {
        room_code: String,
        state: Value,
        timestamp: u64,
    },
    GameOver {
        room_code: String,
        score: Score,
    },
    Ping {
        timestamp: u64,
    },
}

impl ClientMessage {
    pub fn input(room_code: String, player_id: Option<String>, paddle_y: f64) -> Self {
        Self::PlayerInput {
            room_code,
            player_id,
            paddle_y,
            timestamp: unix_millis(),
        }
    }

    pub fn ping() -> Self {
        Self::Ping {
            timestamp: unix_millis(),
        }
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomCreated {
        room_code: String,
        player_id: String,
    },
    RoomJoined {
        room_code: String,
        player_id: String,
    },
    PlayerJoined {
        player_id: String,
    },
    PlayerLeft {
        player_id: String,
    },
    GameStart {
        mode: GameMode,
    },
    GameState {
        state: Value,
        timestamp: u64,
    },
    PlayerInput {
        player_id: String,
        paddle_y: f64,
        timestamp: u64,
    },
    GameOver {
        score: Score,
    },
    Pong {
        timestamp: u64,
    },
    Error {
        error: String,
    },
}
