//! Cache-first lookups that fall back to the repository.
//!
//! Each helper checks its segment under a transaction, loads from storage on
//! a miss and stores the result before the transaction ends.

use crate::cache::{CacheLobbySetEntry, CacheMetadata, CacheSession, Transaction};
use crate::error::ServerError;
use crate::repository::Repository;

/// Resolves a user name to its ID.
pub async fn resolve_user_id(repository: &Repository, name: &str) -> Result<i64, ServerError> {
    if let Some(id) = repository.cache().users().get(name).await {
        return Ok(id);
    }

    // A successful lookup fills the users segment on its own.
    repository
        .users()
        .get_by_name(name)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| ServerError::UserNotFound(name.to_string()))
}

pub async fn session(repository: &Repository, session_id: i64) -> Result<CacheSession, ServerError> {
    let mut sessions = repository.cache().sessions().begin().await;
    if let Some(session) = sessions.get(&session_id) {
        return Ok(session);
    }

    let session = repository
        .sessions()
        .get_by_id(session_id)
        .await?
        .map(|model| CacheSession::from(&model))
        .ok_or(ServerError::SessionNotFound(session_id))?;
    sessions.add(session_id, session.clone());
    sessions.commit();
    Ok(session)
}

/// Sessions issued by the named user, oldest first.
pub async fn user_sessions(
    repository: &Repository,
    name: &str,
) -> Result<Vec<CacheSession>, ServerError> {
    let mut user_sessions = repository.cache().user_sessions().begin().await;
    if let Some(sessions) = user_sessions.get(name) {
        return Ok(sessions);
    }

    let user_id = resolve_user_id(repository, name).await?;
    let sessions: Vec<CacheSession> = repository
        .sessions()
        .get_by_issuer(user_id)
        .await?
        .iter()
        .map(CacheSession::from)
        .collect();
    user_sessions.add(name.to_string(), sessions.clone());
    user_sessions.commit();
    Ok(sessions)
}

pub async fn lobby_set(
    repository: &Repository,
    session_id: i64,
) -> Result<Vec<CacheLobbySetEntry>, ServerError> {
    let mut lobby_sets = repository.cache().lobby_sets().begin().await;
    if let Some(lobby_set) = lobby_sets.get(&session_id) {
        return Ok(lobby_set);
    }

    let rows = repository.lobbies().get_by_session_id(session_id).await?;
    if rows.is_empty() {
        return Err(ServerError::LobbySetNotFound(session_id));
    }

    let mut lobby_set = Vec::with_capacity(rows.len());
    for (lobby, user) in &rows {
        let user = user.as_ref().ok_or(ServerError::UserIdNotFound(lobby.user_id))?;
        lobby_set.push(CacheLobbySetEntry::new(lobby, user.name.clone()));
    }
    lobby_sets.add(session_id, lobby_set.clone());
    lobby_sets.commit();
    Ok(lobby_set)
}

/// Returns the live records of `issuer` inside an open metadata transaction,
/// loading them from the issuer's lobbies on a miss.
pub async fn metadata<'t>(
    metadata: &'t mut Transaction<'_, String, Vec<CacheMetadata>>,
    repository: &Repository,
    issuer: &str,
) -> Result<&'t mut Vec<CacheMetadata>, ServerError> {
    if !metadata.contains(issuer) {
        let user_id = resolve_user_id(repository, issuer).await?;
        let lobbies = repository.lobbies().get_by_user_id(user_id).await?;
        if lobbies.is_empty() {
            return Err(ServerError::LobbyNotFound);
        }
        metadata.add(
            issuer.to_string(),
            lobbies.iter().map(CacheMetadata::from).collect(),
        );
    }

    metadata.get_mut(issuer).ok_or(ServerError::LobbyNotFound)
}
