//! Network Layer
//!
//! WebSocket server that pairs two players in a room and relays their
//! traffic. The server never simulates the game: the host's snapshots are
//! forwarded untouched.

pub mod endpoint;
pub mod liveness;
pub mod protocol;
pub mod relay;
pub mod scores;
pub mod server;
pub mod session;

pub use endpoint::{Endpoint, EndpointRegistry, Outbound};
pub use liveness::{LivenessMonitor, SweepReport};
pub use protocol::{ClientMessage, ProtocolError, Score, ServerMessage};
pub use relay::Relay;
pub use scores::{LogScoreSink, ScoreSink, ScoreSubmission};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{DirectoryError, Room, RoomDirectory, RoomPhase, RoomTable};
