//! Error taxonomy for the live-state server.

use shared::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cache segment `{0}` would have zero capacity")]
    CacheCapacity(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("database unavailable after {attempts} attempts: {source}")]
    DatabaseUnavailable {
        attempts: u32,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("user `{0}` not found")]
    UserNotFound(String),
    #[error("user with id {0} not found")]
    UserIdNotFound(i64),
    #[error("session {0} not found")]
    SessionNotFound(i64),
    #[error("session {0} has not started")]
    SessionNotStarted(i64),
    #[error("session {0} has already started")]
    SessionAlreadyStarted(i64),
    #[error("session `{0}` already exists")]
    SessionAlreadyExists(String),
    #[error("session {0} is not owned by the issuer")]
    SessionNotOwned(i64),
    #[error("session {0} still has lobbies")]
    SessionHasLobbies(i64),
    #[error("session {0} has no free seat")]
    SessionFull(i64),
    #[error("lobby not found")]
    LobbyNotFound,
    #[error("no lobbies registered for session {0}")]
    LobbySetNotFound(i64),
    #[error("lobby already exists")]
    LobbyAlreadyExists,
    #[error("user is not part of the session lobby")]
    UserNotInLobby,
    #[error("user is not the lobby host")]
    UserNotLobbyHost,
    #[error("user is eliminated")]
    UserEliminated,
    #[error("no item within reach")]
    ItemNotFound,
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    /// Whether the error only concerns a single request and should be logged
    /// and dropped rather than stop the component that hit it.
    pub fn is_request_level(&self) -> bool {
        matches!(
            self,
            ServerError::SessionNotFound(_)
                | ServerError::SessionNotStarted(_)
                | ServerError::SessionAlreadyStarted(_)
                | ServerError::SessionAlreadyExists(_)
                | ServerError::SessionNotOwned(_)
                | ServerError::SessionHasLobbies(_)
                | ServerError::SessionFull(_)
                | ServerError::LobbyNotFound
                | ServerError::LobbyAlreadyExists
                | ServerError::UserNotLobbyHost
                | ServerError::LobbySetNotFound(_)
                | ServerError::UserNotInLobby
                | ServerError::UserEliminated
                | ServerError::ItemNotFound
                | ServerError::InvalidRequest(_)
                | ServerError::UserNotFound(_)
                | ServerError::Codec(_)
                | ServerError::Crypto(_)
        )
    }
}
