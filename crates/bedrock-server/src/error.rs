use bedrock_crypto::CryptoError;
use bedrock_proto::ProtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures of the game-packet layer for one connection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("payload does not start with the 0xFE game marker")]
    MissingMarker,

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("encryption is already enabled")]
    AlreadyEncrypted,
}

impl SessionError {
    /// The disconnect message when this error ends the connection, or
    /// `None` when the payload is just dropped.
    pub fn disconnect_message(&self) -> Option<&'static str> {
        match self {
            SessionError::Crypto(_) => Some("Invalid packet checksum"),
            SessionError::Proto(ProtoError::TooManyPackets { .. }) => {
                Some("Too many packets in one batch")
            }
            SessionError::Proto(ProtoError::DecompressedTooLarge { .. }) => {
                Some("Batch too large")
            }
            SessionError::AlreadyEncrypted => Some("Encryption handshake failed"),
            _ => None,
        }
    }
}

/// Why a packet handler gave up on a packet.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{packet} not expected while {state:?}")]
    OutOfOrder {
        packet: &'static str,
        state: crate::session::LoginState,
    },

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
