use super::invalidation;
use crate::cache::{CacheMetadata, NetworkingCache};
use crate::entity::{lobby, user};
use crate::error::ServerError;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use shared::MAX_HEALTH;

/// A new seat in a session.
#[derive(Debug, Clone)]
pub struct NewLobby {
    pub user_id: i64,
    pub session_id: i64,
    pub skin: i64,
    pub host: bool,
}

/// Player state flushed from the cache, matched on `(session_id, skin)`.
///
/// `active` and `host` are only written when set, so a partial flush leaves
/// the stored values alone.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyUpsert {
    pub user_id: i64,
    pub session_id: i64,
    pub skin: i64,
    pub health: u64,
    pub eliminated: bool,
    pub position_x: f64,
    pub position_y: f64,
    pub active: Option<bool>,
    pub host: Option<bool>,
}

impl LobbyUpsert {
    /// Every persisted field of `record`.
    pub fn full(user_id: i64, record: &CacheMetadata) -> Self {
        Self {
            active: Some(record.active),
            host: Some(record.host),
            ..Self::activity(user_id, record)
        }
    }

    /// Only the fields that change during play.
    pub fn activity(user_id: i64, record: &CacheMetadata) -> Self {
        Self {
            user_id,
            session_id: record.session_id,
            skin: record.skin,
            health: record.health,
            eliminated: record.eliminated,
            position_x: record.position_x,
            position_y: record.position_y,
            active: None,
            host: None,
        }
    }
}

fn stored_health(health: u64) -> i64 {
    i64::try_from(health).unwrap_or(i64::MAX)
}

pub struct LobbiesRepository<'a> {
    connection: &'a DatabaseConnection,
    cache: &'a NetworkingCache,
}

impl<'a> LobbiesRepository<'a> {
    pub(super) fn new(connection: &'a DatabaseConnection, cache: &'a NetworkingCache) -> Self {
        Self { connection, cache }
    }

    pub async fn insert(&self, lobby: NewLobby) -> Result<lobby::Model, ServerError> {
        let inserted = lobby::ActiveModel {
            user_id: Set(lobby.user_id),
            session_id: Set(lobby.session_id),
            skin: Set(lobby.skin),
            health: Set(stored_health(MAX_HEALTH)),
            active: Set(false),
            host: Set(lobby.host),
            eliminated: Set(false),
            position_x: Set(0.0),
            position_y: Set(0.0),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.connection)
        .await?;

        invalidation::lobby_changed(self.cache, inserted.session_id).await;
        Ok(inserted)
    }

    pub async fn insert_or_update(&self, upsert: LobbyUpsert) -> Result<lobby::Model, ServerError> {
        let existing = lobby::Entity::find()
            .filter(lobby::Column::SessionId.eq(upsert.session_id))
            .filter(lobby::Column::Skin.eq(upsert.skin))
            .one(self.connection)
            .await?;

        let written = match existing {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.user_id = Set(upsert.user_id);
                active.health = Set(stored_health(upsert.health));
                active.eliminated = Set(upsert.eliminated);
                active.position_x = Set(upsert.position_x);
                active.position_y = Set(upsert.position_y);
                if let Some(is_active) = upsert.active {
                    active.active = Set(is_active);
                }
                if let Some(host) = upsert.host {
                    active.host = Set(host);
                }
                active.update(self.connection).await?
            }
            None => {
                lobby::ActiveModel {
                    user_id: Set(upsert.user_id),
                    session_id: Set(upsert.session_id),
                    skin: Set(upsert.skin),
                    health: Set(stored_health(upsert.health)),
                    active: Set(upsert.active.unwrap_or(false)),
                    host: Set(upsert.host.unwrap_or(false)),
                    eliminated: Set(upsert.eliminated),
                    position_x: Set(upsert.position_x),
                    position_y: Set(upsert.position_y),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(self.connection)
                .await?
            }
        };

        invalidation::lobby_changed(self.cache, written.session_id).await;
        Ok(written)
    }

    /// Moves the host flag of one lobby.
    pub async fn set_host(&self, id: i64, host: bool) -> Result<lobby::Model, ServerError> {
        let existing = lobby::Entity::find_by_id(id)
            .one(self.connection)
            .await?
            .ok_or(ServerError::LobbyNotFound)?;

        let mut active = existing.into_active_model();
        active.host = Set(host);
        let updated = active.update(self.connection).await?;

        invalidation::lobby_changed(self.cache, updated.session_id).await;
        Ok(updated)
    }

    /// Deletes a lobby and its live metadata record.
    pub async fn delete(&self, id: i64) -> Result<bool, ServerError> {
        let Some(existing) = lobby::Entity::find_by_id(id).one(self.connection).await? else {
            return Ok(false);
        };

        let result = lobby::Entity::delete_by_id(id).exec(self.connection).await?;

        invalidation::lobby_changed(self.cache, existing.session_id).await;
        invalidation::lobby_removed(self.cache, id).await;
        Ok(result.rows_affected > 0)
    }

    /// Lobbies of a session with the user holding each one.
    pub async fn get_by_session_id(
        &self,
        session_id: i64,
    ) -> Result<Vec<(lobby::Model, Option<user::Model>)>, ServerError> {
        let rows = lobby::Entity::find()
            .filter(lobby::Column::SessionId.eq(session_id))
            .order_by_asc(lobby::Column::Id)
            .find_also_related(user::Entity)
            .all(self.connection)
            .await?;

        for user in rows.iter().filter_map(|(_, user)| user.as_ref()) {
            invalidation::user_loaded(self.cache, user).await;
        }
        Ok(rows)
    }

    pub async fn get_by_user_id(&self, user_id: i64) -> Result<Vec<lobby::Model>, ServerError> {
        Ok(lobby::Entity::find()
            .filter(lobby::Column::UserId.eq(user_id))
            .order_by_asc(lobby::Column::Id)
            .all(self.connection)
            .await?)
    }

    pub async fn count(&self) -> Result<u64, ServerError> {
        Ok(lobby::Entity::find().count(self.connection).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLobbySetEntry;
    use crate::repository::testing;
    use assert_approx_eq::assert_approx_eq;

    #[tokio::test]
    async fn test_writes_evict_whole_lobby_set() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = repository.sessions().insert("gamma", 3, alice.id).await.unwrap();
        let lobbies = repository.lobbies();

        let first = lobbies
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 1,
                host: true,
            })
            .await
            .unwrap();
        repository
            .cache()
            .lobby_sets()
            .add(session.id, vec![CacheLobbySetEntry::new(&first, "alice")])
            .await;

        lobbies
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 2,
                host: false,
            })
            .await
            .unwrap();

        assert_eq!(repository.cache().lobby_sets().get(&session.id).await, None);
        assert_eq!(lobbies.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_by_session_id_joins_issuers() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let bob = testing::user(&repository, "bob").await;
        let session = repository.sessions().insert("delta", 4, alice.id).await.unwrap();
        for (user, skin) in [(&alice, 1), (&bob, 2)] {
            repository
                .lobbies()
                .insert(NewLobby {
                    user_id: user.id,
                    session_id: session.id,
                    skin,
                    host: skin == 1,
                })
                .await
                .unwrap();
        }
        repository.cache().users().evict("bob").await;

        let rows = repository.lobbies().get_by_session_id(session.id).await.unwrap();
        let names: Vec<&str> = rows
            .iter()
            .filter_map(|(_, user)| user.as_ref().map(|u| u.name.as_str()))
            .collect();

        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(repository.cache().users().get("bob").await, Some(bob.id));
    }

    #[tokio::test]
    async fn test_upsert_matches_session_and_skin() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = repository.sessions().insert("epsilon", 5, alice.id).await.unwrap();
        let lobbies = repository.lobbies();
        let seated = lobbies
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 3,
                host: true,
            })
            .await
            .unwrap();

        let updated = lobbies
            .insert_or_update(LobbyUpsert {
                user_id: alice.id,
                session_id: session.id,
                skin: 3,
                health: 55,
                eliminated: false,
                position_x: 10.5,
                position_y: 20.0,
                active: None,
                host: None,
            })
            .await
            .unwrap();

        assert_eq!(updated.id, seated.id);
        assert_eq!(updated.health, 55);
        assert!(updated.host);
        assert!(!updated.active);
        assert_approx_eq!(updated.position_x, 10.5);
        assert_eq!(lobbies.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_inserts_unknown_seat() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = repository.sessions().insert("zeta", 6, alice.id).await.unwrap();

        let inserted = repository
            .lobbies()
            .insert_or_update(LobbyUpsert {
                user_id: alice.id,
                session_id: session.id,
                skin: 9,
                health: 100,
                eliminated: false,
                position_x: 0.0,
                position_y: 0.0,
                active: Some(true),
                host: Some(false),
            })
            .await
            .unwrap();

        assert!(inserted.active);
        let owned = repository.lobbies().get_by_user_id(alice.id).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert!(repository.lobbies().delete(inserted.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_drops_metadata_record() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = repository.sessions().insert("eta", 7, alice.id).await.unwrap();
        let lobby = repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 2,
                host: true,
            })
            .await
            .unwrap();
        repository
            .cache()
            .metadata()
            .add("alice".to_string(), vec![CacheMetadata::from(&lobby)])
            .await;

        assert!(repository.lobbies().delete(lobby.id).await.unwrap());

        assert!(repository.cache().metadata().get("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_set_host() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = repository.sessions().insert("theta", 8, alice.id).await.unwrap();
        let lobby = repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 0,
                host: false,
            })
            .await
            .unwrap();

        assert!(repository.lobbies().set_host(lobby.id, true).await.unwrap().host);
        assert!(matches!(
            repository.lobbies().set_host(999, true).await,
            Err(ServerError::LobbyNotFound)
        ));
    }
}
