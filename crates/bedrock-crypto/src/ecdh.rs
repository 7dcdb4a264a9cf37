//! ECDH P-384 key agreement.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p384::ecdsa::SigningKey;
use p384::pkcs8::{DecodePublicKey, EncodePublicKey};
use p384::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::CryptoError;

/// The server's ephemeral key pair for one encryption handshake.
pub struct ServerKeyPair {
    secret: SecretKey,
}

impl ServerKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Raw 48-byte x-coordinate of the shared point.
    pub fn shared_secret(&self, peer: &PublicKey) -> [u8; 48] {
        let shared = p384::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        let mut out = [0u8; 48];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        out
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from(self.secret.clone())
    }

    /// Base64 SubjectPublicKeyInfo DER, the format Bedrock uses in `x5u`.
    pub fn public_key_base64(&self) -> Result<String, CryptoError> {
        let der = self
            .public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }
}

/// Parse a base64 SPKI DER key, such as the client's `identityPublicKey`.
pub fn parse_public_key(base64_der: &str) -> Result<PublicKey, CryptoError> {
    let der = STANDARD.decode(base64_der)?;
    PublicKey::from_public_key_der(&der).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}
