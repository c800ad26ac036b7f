//! Values stored in the networking cache segments.

use crate::entity::{lobby, session};
use shared::MAX_HEALTH;
use std::time::Instant;

/// Cached view of a session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSession {
    pub id: i64,
    pub seed: i64,
    pub name: String,
    pub started: bool,
}

impl From<&session::Model> for CacheSession {
    fn from(model: &session::Model) -> Self {
        Self {
            id: model.id,
            seed: model.seed,
            name: model.name.clone(),
            started: model.started,
        }
    }
}

/// One lobby of a session together with the name of the user holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLobbySetEntry {
    pub lobby_id: i64,
    pub issuer: String,
    pub skin: i64,
    pub host: bool,
}

impl CacheLobbySetEntry {
    pub fn new(lobby: &lobby::Model, issuer: impl Into<String>) -> Self {
        Self {
            lobby_id: lobby.id,
            issuer: issuer.into(),
            skin: lobby.skin,
            host: lobby.host,
        }
    }
}

/// Live per-lobby player state.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMetadata {
    pub lobby_id: i64,
    pub session_id: i64,
    pub position_x: f64,
    pub position_y: f64,
    /// Not persisted.
    pub position_static: bool,
    pub skin: i64,
    pub health: u64,
    pub active: bool,
    pub eliminated: bool,
    pub host: bool,
}

impl CacheMetadata {
    /// Removes `amount` health, eliminating the player when none is left.
    pub fn apply_damage(&mut self, amount: u64) {
        self.health = self.health.saturating_sub(amount);
        if self.health == 0 {
            self.eliminated = true;
        }
    }

    pub fn heal(&mut self, amount: u64) {
        self.health = self.health.saturating_add(amount).min(MAX_HEALTH);
    }
}

impl From<&lobby::Model> for CacheMetadata {
    fn from(model: &lobby::Model) -> Self {
        Self {
            lobby_id: model.id,
            session_id: model.session_id,
            position_x: model.position_x,
            position_y: model.position_y,
            position_static: false,
            skin: model.skin,
            health: u64::try_from(model.health).unwrap_or(0),
            active: model.active,
            eliminated: model.eliminated,
            host: model.host,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ToxicRain,
}

impl EventKind {
    pub const ALL: [EventKind; 1] = [EventKind::ToxicRain];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ToxicRain => "toxic_rain",
        }
    }
}

/// Progress of the world event of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEvent {
    /// `None` while no event is running.
    pub name: Option<EventKind>,
    pub end_time: Option<Instant>,
    pub next_hit_time: Option<Instant>,
    pub pause_end_time: Option<Instant>,
}
