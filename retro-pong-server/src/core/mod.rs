//! Core identifiers shared by every network component.
//!
//! Room codes, connection identities and game modes. Nothing in here
//! touches I/O.

pub mod identity;
pub mod mode;
pub mod room_code;

// Re-export core types
pub use identity::ConnectionId;
pub use mode::GameMode;
pub use room_code::{CodeGenerator, RandomCodes, RoomCode, ROOM_CODE_LEN};
