//! Session Directory
//!
//! Owns every open room and the identity -> room index. All membership
//! changes go through [`RoomTable`], which updates both maps in the same
//! call so they can never disagree. [`RoomDirectory`] wraps the table in a
//! reader-writer lock: lookups run concurrently, mutations are serialized.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::{CodeGenerator, ConnectionId, GameMode, RandomCodes, RoomCode};

/// Maximum members per room.
pub const MAX_MEMBERS: usize = 2;

/// Candidate codes tried before giving up on a create.
const MAX_CODE_ATTEMPTS: usize = 64;

/// Room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Created, waiting for the second player and the host's start.
    Waiting,
    /// Match in progress.
    Playing,
    /// Last member left; the room is gone from the directory.
    Closed,
}

/// A two-player room.
#[derive(Debug, Clone)]
pub struct Room {
    /// Shareable code.
    pub code: RoomCode,
    /// Mode chosen at creation.
    pub mode: GameMode,
    /// Current phase.
    pub phase: RoomPhase,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Authoritative member. Always one of `members`.
    host: ConnectionId,
    /// Members in join order.
    members: Vec<ConnectionId>,
}

impl Room {
    fn new(code: RoomCode, creator: ConnectionId, mode: GameMode, created_at: DateTime<Utc>) -> Self {
        Self {
            code,
            mode,
            phase: RoomPhase::Waiting,
            created_at,
            host: creator,
            members: vec![creator],
        }
    }

    /// Current host.
    pub fn host(&self) -> ConnectionId {
        self.host
    }

    /// Members in join order.
    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    /// Whether `id` is a member.
    pub fn is_member(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    /// Whether the room has no free seat.
    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_MEMBERS
    }

    /// Every member except `id`.
    pub fn peers_of(&self, id: ConnectionId) -> Vec<ConnectionId> {
        self.members.iter().copied().filter(|m| *m != id).collect()
    }
}

/// Room operation failures. The display text is sent verbatim to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Code is not six `[A-Z0-9]` characters.
    #[error("Invalid room code format")]
    InvalidRoomCode,

    /// No open room has this code.
    #[error("Room not found")]
    RoomNotFound,

    /// Room already has two members.
    #[error("Room is full")]
    RoomFull,

    /// Room is past the waiting phase.
    #[error("Game already in progress")]
    RoomNotWaiting,

    /// Only the host may start the match.
    #[error("Only host can start the game")]
    NotHost,

    /// Only the host may publish authoritative state.
    #[error("Only host can send game state")]
    NotStateAuthority,

    /// Start requested with a single member.
    #[error("Waiting for second player")]
    InsufficientPlayers,

    /// Sender is not a member of the referenced room.
    #[error("Not a member of this room")]
    NotInRoom,

    /// Sender already belongs to a room.
    #[error("Already in a room")]
    AlreadyInRoom,

    /// No free code found.
    #[error("Could not allocate a room code")]
    CodeSpaceExhausted,
}

/// Who a message kind requires the sender to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Any member of the room.
    Member,
    /// The room's current host.
    Host,
}

/// Routing information for a message the sender is allowed to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Room the message belongs to.
    pub code: RoomCode,
    /// Room mode.
    pub mode: GameMode,
    /// Recipients (every member but the sender).
    pub peers: Vec<ConnectionId>,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    /// Room mode.
    pub mode: GameMode,
    /// All members, host included.
    pub members: Vec<ConnectionId>,
}

/// Result of removing a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Room the member left.
    pub code: RoomCode,
    /// Who left.
    pub member: ConnectionId,
    /// Members still in the room.
    pub remaining: Vec<ConnectionId>,
    /// Set when host authority moved to another member.
    pub new_host: Option<ConnectionId>,
    /// True when the room emptied and was deleted.
    pub closed: bool,
}

// =============================================================================
// ROOM TABLE
// =============================================================================

/// Rooms keyed by code plus the identity -> room index.
///
/// Plain synchronous state; see [`RoomDirectory`] for the shared handle.
pub struct RoomTable {
    rooms: HashMap<RoomCode, Room>,
    memberships: HashMap<ConnectionId, RoomCode>,
    codes: Box<dyn CodeGenerator>,
}

impl RoomTable {
    /// Empty table with random codes.
    pub fn new() -> Self {
        Self::with_codes(Box::new(RandomCodes::new()))
    }

    /// Empty table drawing codes from `codes`.
    pub fn with_codes(codes: Box<dyn CodeGenerator>) -> Self {
        Self {
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            codes,
        }
    }

    /// Open a room with `creator` as sole member and host.
    pub fn create_room(
        &mut self,
        creator: ConnectionId,
        mode: GameMode,
    ) -> Result<RoomCode, DirectoryError> {
        self.create_room_at(creator, mode, Utc::now())
    }

    fn create_room_at(
        &mut self,
        creator: ConnectionId,
        mode: GameMode,
        now: DateTime<Utc>,
    ) -> Result<RoomCode, DirectoryError> {
        if self.memberships.contains_key(&creator) {
            return Err(DirectoryError::AlreadyInRoom);
        }

        let code = (0..MAX_CODE_ATTEMPTS)
            .map(|_| self.codes.generate())
            .find(|candidate| !self.rooms.contains_key(candidate))
            .ok_or(DirectoryError::CodeSpaceExhausted)?;

        self.rooms.insert(code, Room::new(code, creator, mode, now));
        self.memberships.insert(creator, code);
        Ok(code)
    }

    /// Add `joiner` to a waiting room. Returns the members already present.
    pub fn join_room(
        &mut self,
        code: &RoomCode,
        joiner: ConnectionId,
    ) -> Result<Vec<ConnectionId>, DirectoryError> {
        let room = self.rooms.get_mut(code).ok_or(DirectoryError::RoomNotFound)?;

        if room.is_full() {
            return Err(DirectoryError::RoomFull);
        }
        if room.phase != RoomPhase::Waiting {
            return Err(DirectoryError::RoomNotWaiting);
        }
        if self.memberships.contains_key(&joiner) {
            return Err(DirectoryError::AlreadyInRoom);
        }

        let existing = room.members.clone();
        room.members.push(joiner);
        self.memberships.insert(joiner, *code);
        Ok(existing)
    }

    /// Move a full room from waiting to playing.
    pub fn start_game(
        &mut self,
        code: &RoomCode,
        requester: ConnectionId,
    ) -> Result<Started, DirectoryError> {
        let room = self.rooms.get_mut(code).ok_or(DirectoryError::RoomNotFound)?;

        if room.host != requester {
            return Err(DirectoryError::NotHost);
        }
        if room.members.len() < MAX_MEMBERS {
            return Err(DirectoryError::InsufficientPlayers);
        }
        if room.phase != RoomPhase::Waiting {
            return Err(DirectoryError::RoomNotWaiting);
        }

        room.phase = RoomPhase::Playing;
        Ok(Started {
            mode: room.mode,
            members: room.members.clone(),
        })
    }

    /// Remove `member` from the room at `code`.
    ///
    /// Host authority passes to the earliest-joined remaining member; an
    /// emptied room is deleted. Returns `None` if `member` was not in it.
    pub fn remove_member(&mut self, code: &RoomCode, member: ConnectionId) -> Option<Departure> {
        let room = self.rooms.get_mut(code)?;
        let position = room.members.iter().position(|m| *m == member)?;

        room.members.remove(position);
        self.memberships.remove(&member);

        let mut new_host = None;
        if let Some(first) = room.members.first().copied() {
            if room.host == member {
                room.host = first;
                new_host = Some(first);
            }
        }

        let remaining = room.members.clone();
        let closed = remaining.is_empty();
        if closed {
            self.rooms.remove(code);
        }

        Some(Departure {
            code: *code,
            member,
            remaining,
            new_host,
            closed,
        })
    }

    /// Remove `member` from whichever room it is in.
    pub fn leave(&mut self, member: ConnectionId) -> Option<Departure> {
        let code = self.memberships.get(&member).copied()?;
        self.remove_member(&code, member)
    }

    /// Check that `sender` may relay into `code` with the given role.
    pub fn route(
        &self,
        code: &RoomCode,
        sender: ConnectionId,
        role: Role,
    ) -> Result<Route, DirectoryError> {
        let room = self.rooms.get(code).ok_or(DirectoryError::RoomNotFound)?;

        if !room.is_member(sender) {
            return Err(DirectoryError::NotInRoom);
        }
        if role == Role::Host && room.host != sender {
            return Err(DirectoryError::NotStateAuthority);
        }

        Ok(Route {
            code: *code,
            mode: room.mode,
            peers: room.peers_of(sender),
        })
    }

    /// Delete waiting rooms created at or before `cutoff`.
    ///
    /// Returns each evicted room's code and former members.
    pub fn evict_waiting_before(&mut self, cutoff: DateTime<Utc>) -> Vec<(RoomCode, Vec<ConnectionId>)> {
        let stale: Vec<RoomCode> = self
            .rooms
            .values()
            .filter(|room| room.phase == RoomPhase::Waiting && room.created_at <= cutoff)
            .map(|room| room.code)
            .collect();

        stale
            .into_iter()
            .filter_map(|code| {
                let room = self.rooms.remove(&code)?;
                for member in &room.members {
                    self.memberships.remove(member);
                }
                Some((code, room.members))
            })
            .collect()
    }

    /// Room the identity belongs to.
    pub fn room_of(&self, member: ConnectionId) -> Option<RoomCode> {
        self.memberships.get(&member).copied()
    }

    /// Look up a room.
    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// Phase of the room at `code`; [`RoomPhase::Closed`] once it is gone.
    pub fn phase(&self, code: &RoomCode) -> RoomPhase {
        self.rooms.get(code).map_or(RoomPhase::Closed, |room| room.phase)
    }

    /// Number of open rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room is open.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ROOM DIRECTORY
// =============================================================================

/// Shared, synchronized handle on the room table.
///
/// Created once at server start and dropped at shutdown. Every method holds
/// the lock only for the synchronous table call, never across I/O.
pub struct RoomDirectory {
    table: RwLock<RoomTable>,
}

impl RoomDirectory {
    /// Create new directory with random codes.
    pub fn new() -> Self {
        Self::with_table(RoomTable::new())
    }

    /// Wrap an existing table.
    pub fn with_table(table: RoomTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// See [`RoomTable::create_room`].
    pub async fn create_room(
        &self,
        creator: ConnectionId,
        mode: GameMode,
    ) -> Result<RoomCode, DirectoryError> {
        self.table.write().await.create_room(creator, mode)
    }

    /// See [`RoomTable::join_room`].
    pub async fn join_room(
        &self,
        code: &RoomCode,
        joiner: ConnectionId,
    ) -> Result<Vec<ConnectionId>, DirectoryError> {
        self.table.write().await.join_room(code, joiner)
    }

    /// See [`RoomTable::start_game`].
    pub async fn start_game(
        &self,
        code: &RoomCode,
        requester: ConnectionId,
    ) -> Result<Started, DirectoryError> {
        self.table.write().await.start_game(code, requester)
    }

    /// See [`RoomTable::remove_member`].
    pub async fn remove_member(&self, code: &RoomCode, member: ConnectionId) -> Option<Departure> {
        self.table.write().await.remove_member(code, member)
    }

    /// See [`RoomTable::leave`].
    pub async fn leave(&self, member: ConnectionId) -> Option<Departure> {
        self.table.write().await.leave(member)
    }

    /// See [`RoomTable::route`].
    pub async fn route(
        &self,
        code: &RoomCode,
        sender: ConnectionId,
        role: Role,
    ) -> Result<Route, DirectoryError> {
        self.table.read().await.route(code, sender, role)
    }

    /// Evict waiting rooms older than `max_age`.
    pub async fn evict_stale(&self, max_age: std::time::Duration) -> Vec<(RoomCode, Vec<ConnectionId>)> {
        let max_age = ChronoDuration::from_std(max_age).unwrap_or_else(|_| ChronoDuration::weeks(52));
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.table.write().await.evict_waiting_before(cutoff)
    }

    /// Room the identity belongs to.
    pub async fn room_of(&self, member: ConnectionId) -> Option<RoomCode> {
        self.table.read().await.room_of(member)
    }

    /// Copy of a room.
    pub async fn room(&self, code: &RoomCode) -> Option<Room> {
        self.table.read().await.room(code).cloned()
    }

    /// Number of open rooms.
    pub async fn room_count(&self) -> usize {
        self.table.read().await.len()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}
