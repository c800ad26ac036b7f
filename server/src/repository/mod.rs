//! Relational access with cache invalidation.
//!
//! Every write method evicts the cached views that depend on the written row
//! once the write has succeeded. Reads never populate the views themselves;
//! that is left to [`crate::readthrough`]. The one exception is the users
//! segment, which is filled whenever a user row is loaded.

mod invalidation;
mod lobbies;
mod messages;
mod sessions;
mod users;

pub use lobbies::{LobbiesRepository, LobbyUpsert, NewLobby};
pub use messages::MessagesRepository;
pub use sessions::SessionsRepository;
pub use users::UsersRepository;

use crate::cache::NetworkingCache;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Handle to the relational store and the cache it keeps consistent.
#[derive(Clone)]
pub struct Repository {
    connection: DatabaseConnection,
    cache: Arc<NetworkingCache>,
}

impl Repository {
    pub fn new(connection: DatabaseConnection, cache: Arc<NetworkingCache>) -> Self {
        Self { connection, cache }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn cache(&self) -> &Arc<NetworkingCache> {
        &self.cache
    }

    pub fn sessions(&self) -> SessionsRepository<'_> {
        SessionsRepository::new(&self.connection, &self.cache)
    }

    pub fn lobbies(&self) -> LobbiesRepository<'_> {
        LobbiesRepository::new(&self.connection, &self.cache)
    }

    pub fn users(&self) -> UsersRepository<'_> {
        UsersRepository::new(&self.connection, &self.cache)
    }

    pub fn messages(&self) -> MessagesRepository<'_> {
        MessagesRepository::new(&self.connection, &self.cache)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::cache::CacheSession;
    use crate::config::CacheLimits;
    use crate::db;
    use crate::entity::{session, user};
    use std::time::Duration;

    pub(crate) async fn repository() -> Repository {
        repository_with_limits(CacheLimits {
            max_sessions: 16,
            max_session_players: 8,
        })
        .await
    }

    pub(crate) async fn repository_with_limits(limits: CacheLimits) -> Repository {
        let connection = db::connect("sqlite::memory:", Duration::from_millis(1), 0)
            .await
            .unwrap();
        db::create_schema(&connection).await.unwrap();
        let cache = Arc::new(NetworkingCache::new(limits).unwrap());
        Repository::new(connection, cache)
    }

    pub(crate) async fn user(repository: &Repository, name: &str) -> user::Model {
        repository.users().insert(name).await.unwrap()
    }

    /// Inserts a started session issued by `issuer` and caches its view.
    pub(crate) async fn started_session(
        repository: &Repository,
        name: &str,
        seed: i64,
        issuer: &user::Model,
    ) -> session::Model {
        let sessions = repository.sessions();
        let created = sessions.insert(name, seed, issuer.id).await.unwrap();
        let started = sessions.set_started(created.id, true).await.unwrap();
        repository
            .cache()
            .sessions()
            .add(started.id, CacheSession::from(&started))
            .await;
        started
    }
}
