//! In-memory networking cache.
//!
//! The cache is split into independent [`Segment`]s, one per kind of data.
//! Session, lobby and user views mirror storage and are evicted by the
//! repository whenever the rows behind them change. Metadata is the live
//! source for player state and only reaches storage through the
//! reconciliation workers.

mod model;
mod segment;

pub use model::{CacheLobbySetEntry, CacheMetadata, CacheSession, EventKind, SessionEvent};
pub use segment::{Segment, Transaction};

use crate::config::CacheLimits;
use crate::error::ServerError;
use shared::Position;
use std::time::Duration;

pub struct NetworkingCache {
    sessions: Segment<i64, CacheSession>,
    user_sessions: Segment<String, Vec<CacheSession>>,
    lobby_sets: Segment<i64, Vec<CacheLobbySetEntry>>,
    metadata: Segment<String, Vec<CacheMetadata>>,
    user_activity: Segment<String, Duration>,
    users: Segment<String, i64>,
    generated_chests: Segment<String, Vec<Position>>,
    generated_health_packs: Segment<String, Vec<Position>>,
    session_events: Segment<String, SessionEvent>,
}

impl NetworkingCache {
    pub fn new(limits: CacheLimits) -> Result<Self, ServerError> {
        let per_session = limits.session_capacity();
        let per_player = limits.player_capacity();

        Ok(Self {
            sessions: Segment::new("sessions", per_session)?,
            user_sessions: Segment::new("user_sessions", per_player)?,
            lobby_sets: Segment::new("lobby_sets", per_session)?,
            metadata: Segment::new("metadata", per_player)?,
            user_activity: Segment::new("user_activity", per_player)?,
            users: Segment::new("users", per_player)?,
            generated_chests: Segment::new("generated_chests", per_session)?,
            generated_health_packs: Segment::new("generated_health_packs", per_session)?,
            session_events: Segment::new("session_events", per_session)?,
        })
    }

    /// Session rows by ID.
    pub fn sessions(&self) -> &Segment<i64, CacheSession> {
        &self.sessions
    }

    /// Sessions issued by a user, keyed by user name.
    pub fn user_sessions(&self) -> &Segment<String, Vec<CacheSession>> {
        &self.user_sessions
    }

    /// Lobbies of a session, keyed by session ID.
    pub fn lobby_sets(&self) -> &Segment<i64, Vec<CacheLobbySetEntry>> {
        &self.lobby_sets
    }

    /// Live player state, keyed by user name.
    pub fn metadata(&self) -> &Segment<String, Vec<CacheMetadata>> {
        &self.metadata
    }

    /// Last heartbeat per user name, as time since the UNIX epoch.
    pub fn user_activity(&self) -> &Segment<String, Duration> {
        &self.user_activity
    }

    /// User IDs by name.
    pub fn users(&self) -> &Segment<String, i64> {
        &self.users
    }

    /// Unopened chests, keyed by session name.
    pub fn generated_chests(&self) -> &Segment<String, Vec<Position>> {
        &self.generated_chests
    }

    /// Unopened health packs, keyed by session name.
    pub fn generated_health_packs(&self) -> &Segment<String, Vec<Position>> {
        &self.generated_health_packs
    }

    /// World event progress, keyed by session name.
    pub fn session_events(&self) -> &Segment<String, SessionEvent> {
        &self.session_events
    }
}
