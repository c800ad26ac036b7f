//! Wire types shared by the live-state server and its clients.
//!
//! Content updates travel as an [`Envelope`] whose `key` is one of the
//! [`opcode`] strings and whose `payload` is the bincode encoding of the
//! matching request struct. Control traffic uses [`ControlPacket`]. Both are
//! sealed with [`crypto::seal`] before they hit the socket.

pub mod crypto;
pub mod generator;

use serde::{Deserialize, Serialize};

pub use crypto::CryptoError;
pub use generator::{generate_positions, Position};

/// Largest datagram either side is expected to send.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Health every player starts a session with.
pub const MAX_HEALTH: u64 = 100;

/// Content channel opcodes.
pub mod opcode {
    pub const UPDATE_USER_METADATA_POSITIONS: &str = "update_user_metadata_positions";
    pub const UPDATE_USER_METADATA_STATIC: &str = "update_user_metadata_static";
    pub const OPEN_GENERATED_CHEST: &str = "open_generated_chest";
    pub const OPEN_GENERATED_HEALTH_PACK: &str = "open_generated_health_pack";
    pub const SUBMIT_CHAT_MESSAGE: &str = "submit_chat_message";
    pub const HIT_PLAYER_WITH_FIST: &str = "hit_player_with_fist";
}

/// A keyed content update as carried inside one encrypted datagram.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub key: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope by bincode-encoding `request` as the payload.
    pub fn new<T: Serialize>(key: &str, request: &T) -> Result<Self, bincode::Error> {
        Ok(Self {
            key: key.to_string(),
            payload: bincode::serialize(request)?,
        })
    }

    /// Decodes the payload as `T`.
    pub fn decode<'a, T: Deserialize<'a>>(&'a self) -> Result<T, bincode::Error> {
        bincode::deserialize(&self.payload)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpdatePositionRequest {
    pub issuer: String,
    pub session_id: i64,
    pub lobby_id: i64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpdateStaticRequest {
    pub issuer: String,
    pub session_id: i64,
    pub lobby_id: i64,
    pub is_static: bool,
}

/// Opens the generated item closest to `position`.
///
/// Used for both chests and health packs; the opcode decides which set is
/// searched.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OpenItemRequest {
    pub issuer: String,
    pub session_id: i64,
    pub position: Position,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessageRequest {
    pub issuer: String,
    pub session_id: i64,
    pub content: String,
}

/// Strikes every other player of the session within fist reach.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HitPlayerRequest {
    pub issuer: String,
    pub session_id: i64,
}

/// One lobby of a session as reported over the control channel.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LobbySetUnit {
    pub lobby_id: i64,
    pub issuer: String,
    pub skin: i64,
    pub host: bool,
}

/// Control channel packets.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ControlPacket {
    Handshake { issuer: String },
    HandshakeAccepted { user_id: i64 },
    Ping { issuer: String, timestamp: u64 },
    Pong { timestamp: u64 },
    CreateSession { issuer: String, name: String, seed: i64 },
    SessionCreated { session_id: i64 },
    StartSession { issuer: String, session_id: i64 },
    SessionStarted { session_id: i64 },
    RemoveSession { issuer: String, session_id: i64 },
    SessionRemoved { session_id: i64 },
    CreateLobby { issuer: String, session_id: i64 },
    LobbyCreated { lobby_id: i64, skin: i64, host: bool },
    RemoveLobby { issuer: String, session_id: i64 },
    LobbyRemoved { session_id: i64 },
    /// Marks the issuer's lobby inactive without giving it up.
    LeaveLobby { issuer: String, session_id: i64 },
    LobbyLeft { session_id: i64 },
    GetLobbySet { session_id: i64 },
    LobbySet { session_id: i64, entries: Vec<LobbySetUnit> },
    Rejected { reason: String },
}
