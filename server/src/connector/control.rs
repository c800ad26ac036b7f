//! Control channel request handling: identity, heartbeats and the session
//! and lobby lifecycle.

use crate::cache::{CacheLobbySetEntry, CacheMetadata, CacheSession};
use crate::error::ServerError;
use crate::readthrough;
use crate::repository::{NewLobby, Repository};
use crate::utils::since_epoch;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use shared::{ControlPacket, LobbySetUnit};

const MAX_NAME_LEN: usize = 64;

/// Answers control packets against the repository and networking cache.
pub struct ControlHandler {
    repository: Repository,
    max_session_players: usize,
}

impl ControlHandler {
    pub fn new(repository: Repository, max_session_players: usize) -> Self {
        Self {
            repository,
            max_session_players,
        }
    }

    /// Builds the reply to one control packet. Failures become
    /// [`ControlPacket::Rejected`].
    pub async fn respond(&self, packet: ControlPacket) -> ControlPacket {
        let result = match packet {
            ControlPacket::Handshake { issuer } => self.register(&issuer).await.map(|user_id| {
                info!("Handshake from {} accepted as user {}", issuer, user_id);
                ControlPacket::HandshakeAccepted { user_id }
            }),
            ControlPacket::Ping { issuer, timestamp } => {
                self.heartbeat(issuer).await;
                Ok(ControlPacket::Pong { timestamp })
            }
            ControlPacket::CreateSession { issuer, name, seed } => {
                self.create_session(&issuer, &name, seed).await
            }
            ControlPacket::StartSession { issuer, session_id } => {
                self.start_session(&issuer, session_id).await
            }
            ControlPacket::RemoveSession { issuer, session_id } => {
                self.remove_session(&issuer, session_id).await
            }
            ControlPacket::CreateLobby { issuer, session_id } => {
                self.create_lobby(&issuer, session_id).await
            }
            ControlPacket::RemoveLobby { issuer, session_id } => {
                self.remove_lobby(&issuer, session_id).await
            }
            ControlPacket::LeaveLobby { issuer, session_id } => {
                self.leave_lobby(&issuer, session_id).await
            }
            ControlPacket::GetLobbySet { session_id } => self.get_lobby_set(session_id).await,
            other => {
                return ControlPacket::Rejected {
                    reason: format!("unexpected control packet {:?}", other),
                }
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Control request rejected: {}", e);
            ControlPacket::Rejected {
                reason: e.to_string(),
            }
        })
    }

    /// Returns the ID of `issuer`, creating the user on first contact.
    async fn register(&self, issuer: &str) -> Result<i64, ServerError> {
        if issuer.is_empty() || issuer.len() > MAX_NAME_LEN {
            return Err(ServerError::InvalidRequest("issuer name must be 1 to 64 bytes"));
        }

        match readthrough::resolve_user_id(&self.repository, issuer).await {
            Ok(id) => Ok(id),
            Err(ServerError::UserNotFound(_)) => Ok(self.repository.users().insert(issuer).await?.id),
            Err(e) => Err(e),
        }
    }

    async fn heartbeat(&self, issuer: String) {
        match readthrough::resolve_user_id(&self.repository, &issuer).await {
            Ok(_) => {
                self.repository
                    .cache()
                    .user_activity()
                    .add(issuer, since_epoch())
                    .await
            }
            Err(e) => debug!("Ping from unregistered issuer: {}", e),
        }
    }

    async fn create_session(
        &self,
        issuer: &str,
        name: &str,
        seed: i64,
    ) -> Result<ControlPacket, ServerError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(ServerError::InvalidRequest("session name must be 1 to 64 bytes"));
        }

        let user_id = readthrough::resolve_user_id(&self.repository, issuer).await?;
        let sessions = self.repository.sessions();
        if sessions.get_by_name(name).await?.is_some() {
            return Err(ServerError::SessionAlreadyExists(name.to_string()));
        }

        let session = sessions.insert(name, seed, user_id).await?;
        Ok(ControlPacket::SessionCreated {
            session_id: session.id,
        })
    }

    /// Only the host of a session may start it. The started session and its
    /// lobby set are loaded into the cache straight away.
    async fn start_session(
        &self,
        issuer: &str,
        session_id: i64,
    ) -> Result<ControlPacket, ServerError> {
        let session = self.pending_session(session_id).await?;
        let lobby_set = readthrough::lobby_set(&self.repository, session.id).await?;
        let own = lobby_set
            .iter()
            .find(|entry| entry.issuer == issuer)
            .ok_or(ServerError::UserNotInLobby)?;
        if !own.host {
            return Err(ServerError::UserNotLobbyHost);
        }

        self.repository.sessions().set_started(session.id, true).await?;
        readthrough::session(&self.repository, session.id).await?;
        readthrough::lobby_set(&self.repository, session.id).await?;

        info!("{} started session {}", issuer, session.name);
        Ok(ControlPacket::SessionStarted {
            session_id: session.id,
        })
    }

    /// Deletes a session issued by `issuer` once every lobby has left it.
    async fn remove_session(
        &self,
        issuer: &str,
        session_id: i64,
    ) -> Result<ControlPacket, ServerError> {
        let owned = readthrough::user_sessions(&self.repository, issuer).await?;
        if !owned.iter().any(|session| session.id == session_id) {
            // Distinguish a foreign session from a missing one.
            readthrough::session(&self.repository, session_id).await?;
            return Err(ServerError::SessionNotOwned(session_id));
        }

        match readthrough::lobby_set(&self.repository, session_id).await {
            Ok(lobby_set) if !lobby_set.is_empty() => {
                return Err(ServerError::SessionHasLobbies(session_id))
            }
            Ok(_) | Err(ServerError::LobbySetNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.repository.sessions().delete(session_id).await?;
        info!("{} removed session {}", issuer, session_id);
        Ok(ControlPacket::SessionRemoved { session_id })
    }

    /// Seats `issuer` in a session that has not started yet, on a random free
    /// skin. The first lobby of a session becomes its host.
    async fn create_lobby(&self, issuer: &str, session_id: i64) -> Result<ControlPacket, ServerError> {
        let user_id = readthrough::resolve_user_id(&self.repository, issuer).await?;
        let session = self.pending_session(session_id).await?;
        let lobby_set = self.lobby_set_or_empty(session.id).await?;

        if lobby_set.iter().any(|entry| entry.issuer == issuer) {
            return Err(ServerError::LobbyAlreadyExists);
        }
        if lobby_set.len() >= self.max_session_players {
            return Err(ServerError::SessionFull(session.id));
        }

        let free: Vec<i64> = (0..self.max_session_players as i64)
            .filter(|skin| lobby_set.iter().all(|entry| entry.skin != *skin))
            .collect();
        let skin = *free
            .choose(&mut rand::thread_rng())
            .ok_or(ServerError::SessionFull(session.id))?;
        let host = lobby_set.is_empty();

        let lobby = self
            .repository
            .lobbies()
            .insert(NewLobby {
                user_id,
                session_id: session.id,
                skin,
                host,
            })
            .await?;

        // Cached records of the issuer's other lobbies keep their live state.
        let mut metadata = self.repository.cache().metadata().begin().await;
        if let Some(records) = metadata.get_mut(issuer) {
            records.push(CacheMetadata::from(&lobby));
        }
        metadata.commit();

        debug!("{} joined session {} with skin {}", issuer, session.name, skin);
        Ok(ControlPacket::LobbyCreated {
            lobby_id: lobby.id,
            skin,
            host,
        })
    }

    /// Gives up the issuer's seat before the session starts. A leaving host
    /// hands the role to a random remaining lobby.
    async fn remove_lobby(&self, issuer: &str, session_id: i64) -> Result<ControlPacket, ServerError> {
        let session = self.pending_session(session_id).await?;
        let lobby_set = readthrough::lobby_set(&self.repository, session.id).await?;
        let own = lobby_set
            .iter()
            .find(|entry| entry.issuer == issuer)
            .ok_or(ServerError::LobbyNotFound)?;

        if own.host {
            let others: Vec<&CacheLobbySetEntry> = lobby_set
                .iter()
                .filter(|entry| entry.lobby_id != own.lobby_id)
                .collect();
            let successor = others.choose(&mut rand::thread_rng()).copied();
            if let Some(successor) = successor {
                self.repository.lobbies().set_host(successor.lobby_id, true).await?;

                let mut metadata = self.repository.cache().metadata().begin().await;
                if let Some(record) = metadata
                    .get_mut(successor.issuer.as_str())
                    .and_then(|records| {
                        records
                            .iter_mut()
                            .find(|record| record.lobby_id == successor.lobby_id)
                    })
                {
                    record.host = true;
                }
                metadata.commit();
                info!("{} took over hosting session {}", successor.issuer, session.name);
            }
        }

        self.repository.lobbies().delete(own.lobby_id).await?;
        debug!("{} left session {}", issuer, session.name);
        Ok(ControlPacket::LobbyRemoved {
            session_id: session.id,
        })
    }

    /// Marks the issuer's record in a session inactive. The seat is kept.
    async fn leave_lobby(&self, issuer: &str, session_id: i64) -> Result<ControlPacket, ServerError> {
        let mut metadata = self.repository.cache().metadata().begin().await;
        let records = readthrough::metadata(&mut metadata, &self.repository, issuer).await?;
        let record = records
            .iter_mut()
            .find(|record| record.session_id == session_id)
            .ok_or(ServerError::LobbyNotFound)?;

        record.active = false;
        metadata.commit();
        Ok(ControlPacket::LobbyLeft { session_id })
    }

    async fn get_lobby_set(&self, session_id: i64) -> Result<ControlPacket, ServerError> {
        let entries = readthrough::lobby_set(&self.repository, session_id)
            .await?
            .into_iter()
            .map(|entry| LobbySetUnit {
                lobby_id: entry.lobby_id,
                issuer: entry.issuer,
                skin: entry.skin,
                host: entry.host,
            })
            .collect();
        Ok(ControlPacket::LobbySet {
            session_id,
            entries,
        })
    }

    async fn pending_session(&self, session_id: i64) -> Result<CacheSession, ServerError> {
        let session = readthrough::session(&self.repository, session_id).await?;
        if session.started {
            return Err(ServerError::SessionAlreadyStarted(session.id));
        }
        Ok(session)
    }

    async fn lobby_set_or_empty(
        &self,
        session_id: i64,
    ) -> Result<Vec<CacheLobbySetEntry>, ServerError> {
        match readthrough::lobby_set(&self.repository, session_id).await {
            Err(ServerError::LobbySetNotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}
