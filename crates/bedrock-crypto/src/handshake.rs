//! Server side of the encryption handshake: derive the session key and
//! build the signed JWT for ServerToClientHandshake.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use p384::ecdsa::signature::Signer;
use p384::ecdsa::Signature;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::cipher::PacketEncryption;
use crate::ecdh::{parse_public_key, ServerKeyPair};
use crate::CryptoError;

/// `key = SHA256(salt || shared_secret)`, `iv = key[..16]`.
pub fn derive_key(salt: &[u8; 16], shared_secret: &[u8]) -> ([u8; 32], [u8; 16]) {
    let key: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(shared_secret)
        .finalize()
        .into();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&key[..16]);
    (key, iv)
}

/// Build the ES384 JWT carrying the server public key and salt.
///
/// ```text
/// header:  {"alg":"ES384","x5u":<server key>}
/// payload: {"salt":<base64 salt>,"signedToken":<server key>}
/// ```
pub fn create_handshake_jwt(
    keypair: &ServerKeyPair,
    salt: &[u8; 16],
) -> Result<String, CryptoError> {
    let public_key = keypair.public_key_base64()?;
    let header = serde_json::json!({ "alg": "ES384", "x5u": public_key });
    let payload = serde_json::json!({
        "salt": STANDARD.encode(salt),
        "signedToken": public_key,
    });

    let message = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );
    let signature: Signature = keypair
        .signing_key()
        .try_sign(message.as_bytes())
        .map_err(|e| CryptoError::JwtSign(e.to_string()))?;

    Ok(format!(
        "{message}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// The outcome of starting encryption with one client.
pub struct HandshakeStart {
    /// Goes into ServerToClientHandshake, which is still sent in plaintext.
    pub jwt: String,
    /// Switch this on right after the handshake packet is written.
    pub encryption: PacketEncryption,
}

/// Agree on a key with the client identified by its `identityPublicKey`.
pub fn begin_handshake(client_public_key: &str) -> Result<HandshakeStart, CryptoError> {
    let client_key = parse_public_key(client_public_key)?;
    let keypair = ServerKeyPair::generate();

    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let (key, iv) = derive_key(&salt, &keypair.shared_secret(&client_key));
    Ok(HandshakeStart {
        jwt: create_handshake_jwt(&keypair, &salt)?,
        encryption: PacketEncryption::new(&key, &iv),
    })
}
