//! Datagram sealing for both UDP channels.
//!
//! A frame is `nonce || ciphertext`, where the ciphertext is the
//! ChaCha20-Poly1305 encryption of a bincode value under a key derived from
//! the shared passphrase with BLAKE2s-256.

use blake2::{Blake2s256, Digest};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Symmetric key shared by every participant of a deployment.
pub type FrameKey = [u8; 32];

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("frame of {0} bytes is too short to be sealed")]
    Truncated(usize),
    #[error("frame failed authentication")]
    Authentication,
    #[error("frame could not be sealed")]
    Seal,
    #[error("frame body could not be encoded: {0}")]
    Codec(#[from] bincode::Error),
}

/// Derives the fixed-length channel key from a passphrase.
pub fn derive_key(passphrase: &str) -> FrameKey {
    let digest = Blake2s256::digest(passphrase.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

pub fn seal(key: &FrameKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Seal)?;

    let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

pub fn open(key: &FrameKey, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if frame.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Truncated(frame.len()));
    }

    let (nonce, ciphertext) = frame.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

/// Encodes `value` with bincode and seals it.
pub fn seal_packet<T: Serialize>(key: &FrameKey, value: &T) -> Result<Vec<u8>, CryptoError> {
    let plaintext = bincode::serialize(value)?;
    seal(key, &plaintext)
}

/// Opens a frame and decodes its body as `T`.
pub fn open_packet<T: DeserializeOwned>(key: &FrameKey, frame: &[u8]) -> Result<T, CryptoError> {
    let plaintext = open(key, frame)?;
    Ok(bincode::deserialize(&plaintext)?)
}
