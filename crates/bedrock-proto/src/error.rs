//! Protocol-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short: need {needed} more bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("VarInt encoding error: {0}")]
    VarInt(#[from] crate::types::VarIntError),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("decompression error: {0}")]
    DecompressError(String),

    #[error("compression error: {0}")]
    CompressError(String),

    #[error("unknown compression algorithm: {0}")]
    UnknownCompression(u16),

    #[error("decompressed batch exceeds {limit} bytes")]
    DecompressedTooLarge { limit: usize },

    #[error("packet batch is empty")]
    EmptyBatch,

    #[error("batch holds more than {limit} packets")]
    TooManyPackets { limit: usize },

    #[error("unknown packet id: 0x{0:02X}")]
    UnknownPacketId(u32),

    #[error("JWT decode error: {0}")]
    JwtDecode(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("invalid login data: {0}")]
    InvalidLogin(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl ProtoError {
    /// Shorthand for the common "not enough bytes left" check.
    pub fn ensure(buf: &impl bytes::Buf, needed: usize) -> Result<(), ProtoError> {
        if buf.remaining() < needed {
            return Err(ProtoError::BufferTooShort {
                needed,
                remaining: buf.remaining(),
            });
        }
        Ok(())
    }
}
