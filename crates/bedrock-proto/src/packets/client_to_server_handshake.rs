//! ClientToServerHandshake (0x04): empty. Its arrival, already encrypted,
//! confirms the client derived the same key.

use bytes::{Buf, BufMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientToServerHandshake;

impl ProtoEncode for ClientToServerHandshake {
    fn proto_encode(&self, _buf: &mut impl BufMut) {}
}

impl ProtoDecode for ClientToServerHandshake {
    fn proto_decode(_buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self)
    }
}
