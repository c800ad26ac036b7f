use super::{flush_metadata, ticker, FlushMode};
use crate::error::ServerError;
use crate::repository::Repository;
use log::info;
use std::time::Duration;

/// Persists the full live state of every cached player.
pub struct RepositorySync {
    repository: Repository,
    period: Duration,
}

impl RepositorySync {
    pub fn new(repository: Repository, period: Duration) -> Self {
        Self { repository, period }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        info!("Repository sync running every {:?}", self.period);
        let mut ticker = ticker(self.period);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.tick().await?;
        }
    }

    pub async fn tick(&self) -> Result<usize, ServerError> {
        flush_metadata(&self.repository, FlushMode::Full).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readthrough;
    use crate::repository::{testing, NewLobby};
    use assert_approx_eq::assert_approx_eq;

    #[tokio::test]
    async fn test_tick_persists_live_state() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = testing::started_session(&repository, "kappa", 1, &alice).await;
        repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 2,
                host: false,
            })
            .await
            .unwrap();

        {
            let mut tx = repository.cache().metadata().begin().await;
            let records = readthrough::metadata(&mut tx, &repository, "alice").await.unwrap();
            records[0].active = true;
            records[0].host = true;
            records[0].position_x = 44.0;
            records[0].apply_damage(10);
        }

        let sync = RepositorySync::new(repository.clone(), Duration::from_secs(15));
        assert_eq!(sync.tick().await.unwrap(), 1);

        let stored = repository.lobbies().get_by_user_id(alice.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].health, 90);
        assert!(stored[0].active);
        assert!(stored[0].host);
        assert_approx_eq!(stored[0].position_x, 44.0);
    }

    #[tokio::test]
    async fn test_unknown_issuer_fails_tick() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = testing::started_session(&repository, "lambda", 1, &alice).await;
        let lobby = repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 1,
                host: false,
            })
            .await
            .unwrap();
        repository
            .cache()
            .metadata()
            .add(
                "ghost".to_string(),
                vec![crate::cache::CacheMetadata::from(&lobby)],
            )
            .await;

        let sync = RepositorySync::new(repository, Duration::from_secs(15));
        assert!(matches!(sync.tick().await, Err(ServerError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_tick_after_session_delete() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = testing::started_session(&repository, "nu", 1, &alice).await;
        repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 1,
                host: true,
            })
            .await
            .unwrap();
        {
            let mut tx = repository.cache().metadata().begin().await;
            readthrough::metadata(&mut tx, &repository, "alice").await.unwrap();
        }

        repository.sessions().delete(session.id).await.unwrap();

        let sync = RepositorySync::new(repository.clone(), Duration::from_secs(15));
        assert_eq!(sync.tick().await.unwrap(), 0);
        assert_eq!(repository.lobbies().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tick_skips_records_of_missing_sessions() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = testing::started_session(&repository, "xi", 1, &alice).await;
        let lobby = repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 1,
                host: true,
            })
            .await
            .unwrap();
        let mut orphan = crate::cache::CacheMetadata::from(&lobby);
        orphan.session_id = 999;
        repository
            .cache()
            .metadata()
            .add(
                "alice".to_string(),
                vec![crate::cache::CacheMetadata::from(&lobby), orphan],
            )
            .await;

        let sync = RepositorySync::new(repository.clone(), Duration::from_secs(15));
        assert_eq!(sync.tick().await.unwrap(), 1);
        assert_eq!(repository.lobbies().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tick_reloads_lobby_sets() {
        let repository = testing::repository().await;
        let alice = testing::user(&repository, "alice").await;
        let session = testing::started_session(&repository, "omicron", 1, &alice).await;
        repository
            .lobbies()
            .insert(NewLobby {
                user_id: alice.id,
                session_id: session.id,
                skin: 1,
                host: true,
            })
            .await
            .unwrap();
        readthrough::lobby_set(&repository, session.id).await.unwrap();
        {
            let mut tx = repository.cache().metadata().begin().await;
            readthrough::metadata(&mut tx, &repository, "alice").await.unwrap();
        }

        let sync = RepositorySync::new(repository.clone(), Duration::from_secs(15));
        sync.tick().await.unwrap();

        let lobby_set = repository.cache().lobby_sets().get(&session.id).await.unwrap();
        assert_eq!(lobby_set.len(), 1);
        assert_eq!(lobby_set[0].issuer, "alice");
    }
}
