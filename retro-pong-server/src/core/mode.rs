//! Game Modes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Game mode chosen by the room creator. Fixed for the life of the room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// First to the target score.
    #[default]
    Classic,
    /// Power-ups enabled.
    Arcade,
    /// Most points before the clock runs out.
    TimeAttack,
    /// Multiple balls and random events.
    Chaos,
    /// Ball speeds up until someone misses.
    Survival,
}

impl GameMode {
    /// Every mode, in menu order.
    pub const ALL: [GameMode; 5] = [
        GameMode::Classic,
        GameMode::Arcade,
        GameMode::TimeAttack,
        GameMode::Chaos,
        GameMode::Survival,
    ];

    /// Wire name of the mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Arcade => "arcade",
            GameMode::TimeAttack => "timeattack",
            GameMode::Chaos => "chaos",
            GameMode::Survival => "survival",
        }
    }

    /// Whether final scores in this mode go to the leaderboard.
    pub const fn has_leaderboard(&self) -> bool {
        matches!(self, GameMode::Classic | GameMode::Arcade)
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
