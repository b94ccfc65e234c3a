//! Final Score Hand-off
//!
//! The leaderboard lives outside this server. When a host reports a final
//! score the relay hands it to a [`ScoreSink`]; storage, rate limiting and
//! presentation are the sink's business.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::core::{GameMode, RoomCode};
use crate::network::protocol::Score;

/// Highest per-player score treated as plausible.
pub const MAX_PLAUSIBLE_SCORE: u32 = 100;

/// A final score ready for the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSubmission {
    /// Room the match was played in.
    pub room: RoomCode,
    /// Mode of the match.
    pub mode: GameMode,
    /// Final score as reported by the host.
    pub score: Score,
    /// Passed the coarse bounds check.
    pub verified: bool,
    /// When the score was received.
    pub submitted_at: DateTime<Utc>,
}

impl ScoreSubmission {
    /// Build a submission, running the bounds check.
    pub fn new(room: RoomCode, mode: GameMode, score: Score) -> Self {
        Self {
            room,
            mode,
            score,
            verified: is_plausible(&score),
            submitted_at: Utc::now(),
        }
    }
}

/// Coarse anti-cheat: both sides within `0..=MAX_PLAUSIBLE_SCORE`.
pub fn is_plausible(score: &Score) -> bool {
    score.p1 <= MAX_PLAUSIBLE_SCORE && score.p2 <= MAX_PLAUSIBLE_SCORE
}

/// Receiver of final scores ("submit final score for mode M").
pub trait ScoreSink: Send + Sync {
    /// Accept one submission. Must not block.
    fn submit_final_score(&self, submission: ScoreSubmission);
}

/// Default sink: logs submissions and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogScoreSink;

impl ScoreSink for LogScoreSink {
    fn submit_final_score(&self, submission: ScoreSubmission) {
        info!(
            room = %submission.room,
            mode = %submission.mode,
            p1 = submission.score.p1,
            p2 = submission.score.p2,
            verified = submission.verified,
            "final score submitted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plausibility_bounds() {
        assert!(is_plausible(&Score { p1: 0, p2: 0 }));
        assert!(is_plausible(&Score { p1: 100, p2: 7 }));
        assert!(!is_plausible(&Score { p1: 101, p2: 0 }));
        assert!(!is_plausible(&Score { p1: 3, p2: 5000 }));
    }

    #[test]
    fn test_submission_marks_unverified() {
        let room = RoomCode::parse("SCORE1").unwrap();
        let ok = ScoreSubmission::new(room, GameMode::Classic, Score { p1: 11, p2: 4 });
        let bad = ScoreSubmission::new(room, GameMode::Classic, Score { p1: 999, p2: 4 });
        assert!(ok.verified);
        assert!(!bad.verified);
    }
}
