//! Reading the login JWTs. Signatures are not verified here; this layer only
//! needs the identity claims and the client's public key.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;

use crate::error::ProtoError;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub x5u: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExtraData {
    #[serde(rename = "XUID", default)]
    xuid: String,
    identity: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainClaims {
    #[serde(default)]
    extra_data: Option<ExtraData>,
    #[serde(default)]
    identity_public_key: Option<String>,
}

/// Who the client says it is, taken from the identity chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginIdentity {
    pub xuid: String,
    pub identity: String,
    pub display_name: String,
    /// Base64 DER SubjectPublicKeyInfo of the client's P-384 key.
    pub identity_public_key: String,
}

/// Split a compact JWT and decode its header and payload.
pub fn decode_jwt_unverified(token: &str) -> Result<(JwtHeader, serde_json::Value), ProtoError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ProtoError::JwtDecode("expected 3 dot-separated parts".into()));
    };

    let header = decode_base64url(header)
        .map_err(|e| ProtoError::JwtDecode(format!("header base64: {e}")))?;
    let payload = decode_base64url(payload)
        .map_err(|e| ProtoError::JwtDecode(format!("payload base64: {e}")))?;

    let header: JwtHeader = serde_json::from_slice(&header)
        .map_err(|e| ProtoError::JsonParse(format!("JWT header: {e}")))?;
    let payload: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| ProtoError::JsonParse(format!("JWT payload: {e}")))?;
    Ok((header, payload))
}

/// Walk the chain from the end and return the first link carrying
/// `extraData`. That link also holds the client's `identityPublicKey`.
pub fn extract_identity(chain: &[String]) -> Result<LoginIdentity, ProtoError> {
    if chain.is_empty() {
        return Err(ProtoError::InvalidLogin("empty JWT chain".into()));
    }

    for token in chain.iter().rev() {
        let (_, payload) = decode_jwt_unverified(token)?;
        let Ok(claims) = serde_json::from_value::<ChainClaims>(payload) else {
            continue;
        };
        if let Some(extra) = claims.extra_data {
            let identity_public_key = claims
                .identity_public_key
                .ok_or_else(|| ProtoError::InvalidLogin("missing identityPublicKey".into()))?;
            return Ok(LoginIdentity {
                xuid: extra.xuid,
                identity: extra.identity,
                display_name: extra.display_name,
                identity_public_key,
            });
        }
    }

    Err(ProtoError::InvalidLogin(
        "no identity data found in JWT chain".into(),
    ))
}

/// Read the chain out of the login connection request. Accepts both the
/// legacy `{"chain": [...]}` layout and the newer one where the chain sits
/// in a JSON-encoded `Certificate` string.
pub fn parse_chain(data: &[u8]) -> Result<Vec<String>, ProtoError> {
    let value: serde_json::Value =
        serde_json::from_slice(data).map_err(|e| ProtoError::JsonParse(e.to_string()))?;

    let certificate;
    let holder = match value.get("Certificate").and_then(|c| c.as_str()) {
        Some(cert) => {
            certificate = serde_json::from_str::<serde_json::Value>(cert)
                .map_err(|e| ProtoError::JsonParse(format!("Certificate: {e}")))?;
            &certificate
        }
        None => &value,
    };

    let chain = holder
        .get("chain")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProtoError::InvalidLogin("missing 'chain' array in login data".into()))?;

    chain
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| ProtoError::InvalidLogin("chain item is not a string".into()))
        })
        .collect()
}

fn decode_base64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD
        .decode(input)
        .or_else(|_| URL_SAFE.decode(input))
}
