//! Room Codes
//!
//! Six-character uppercase alphanumeric codes that players read out to each
//! other to join a room. Generation goes through [`CodeGenerator`] so the
//! directory can be driven with a scripted sequence in tests.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Serializer};

/// Characters a room code is drawn from.
pub const ROOM_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of characters in every room code.
pub const ROOM_CODE_LEN: usize = 6;

/// A validated room code.
///
/// Always exactly [`ROOM_CODE_LEN`] bytes from [`ROOM_CODE_ALPHABET`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCode([u8; ROOM_CODE_LEN]);

impl RoomCode {
    /// Parse user input into a room code.
    ///
    /// Input is uppercased first, so `"ab12cd"` is accepted as `"AB12CD"`.
    /// Returns `None` unless the result is six characters of `[A-Z0-9]`.
    pub fn parse(input: &str) -> Option<Self> {
        let bytes = input.as_bytes();
        if bytes.len() != ROOM_CODE_LEN {
            return None;
        }

        let mut code = [0u8; ROOM_CODE_LEN];
        for (slot, byte) in code.iter_mut().zip(bytes) {
            let upper = byte.to_ascii_uppercase();
            if !upper.is_ascii_uppercase() && !upper.is_ascii_digit() {
                return None;
            }
            *slot = upper;
        }
        Some(Self(code))
    }

    /// Build a code from alphabet indices (each taken modulo 36).
    pub fn from_indices(indices: [usize; ROOM_CODE_LEN]) -> Self {
        let mut code = [0u8; ROOM_CODE_LEN];
        for (slot, index) in code.iter_mut().zip(indices) {
            *slot = ROOM_CODE_ALPHABET[index % ROOM_CODE_ALPHABET.len()];
        }
        Self(code)
    }

    /// View the code as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ASCII bytes are ever stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomCode({})", self.as_str())
    }
}

impl Serialize for RoomCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// Source of candidate room codes.
///
/// Candidates may repeat; the directory retries until it finds one that is
/// not currently open.
pub trait CodeGenerator: Send + Sync {
    /// Produce the next candidate code.
    fn generate(&mut self) -> RoomCode;
}

/// Uniformly random codes over the full 36^6 space.
pub struct RandomCodes {
    rng: StdRng,
}

impl RandomCodes {
    /// Seed from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixed seed, for reproducible sequences.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for RandomCodes {
    fn generate(&mut self) -> RoomCode {
        let mut indices = [0usize; ROOM_CODE_LEN];
        for index in indices.iter_mut() {
            *index = self.rng.gen_range(0..ROOM_CODE_ALPHABET.len());
        }
        RoomCode::from_indices(indices)
    }
}
