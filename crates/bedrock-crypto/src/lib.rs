//! Encryption for the Bedrock game-packet layer: ECDH P-384 key agreement,
//! AES-256-CFB8 with sequenced SHA-256 checksums, and the signed handshake JWT.

pub mod cipher;
pub mod ecdh;
pub mod handshake;

pub use cipher::PacketEncryption;
pub use ecdh::{parse_public_key, ServerKeyPair};
pub use handshake::{begin_handshake, create_handshake_jwt, derive_key, HandshakeStart};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("packet checksum mismatch (packet #{counter})")]
    ChecksumMismatch { counter: u64 },

    #[error("encrypted payload too short: {0} bytes")]
    PayloadTooShort(usize),

    #[error("JWT signing error: {0}")]
    JwtSign(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
