//! Stale input filter
//!
//! Keeps the newest input timestamp seen per player. Input stamped strictly
//! earlier than that is out of order and dropped; equal stamps pass.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InputGate {
    latest: HashMap<String, u64>,
}

impl InputGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the input should be applied.
    pub fn accept(&mut self, player_id: &str, timestamp: u64) -> bool {
        match self.latest.get_mut(player_id) {
            Some(latest) if timestamp < *latest => false,
            Some(latest) => {
                *latest = timestamp;
                true
            }
            None => {
                self.latest.insert(player_id.to_string(), timestamp);
                true
            }
        }
    }

    pub fn latest(&self, player_id: &str) -> Option<u64> {
        self.latest.get(player_id).copied()
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_strictly_older() {
        let mut gate = InputGate::new();
        assert!(gate.accept("p1", 100));
        assert!(gate.accept("p1", 120));
        assert!(!gate.accept("p1", 110));
        assert!(gate.accept("p1", 120));
        assert_eq!(gate.latest("p1"), Some(120));
    }

    #[test]
    fn test_players_tracked_separately() {
        let mut gate = InputGate::new();
        assert!(gate.accept("p1", 500));
        assert!(gate.accept("p2", 100));
        assert!(!gate.accept("p2", 50));
    }

    #[test]
    fn test_clear_forgets_history() {
        let mut gate = InputGate::new();
        gate.accept("p1", 500);
        gate.clear();
        assert!(gate.accept("p1", 1));
    }
}
