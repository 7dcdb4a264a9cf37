//! ServerToClientHandshake (0x03): carries the ES384-signed JWT holding the
//! server public key and salt.

use bytes::{Buf, BufMut};

use crate::codec::{self, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerToClientHandshake {
    pub jwt: String,
}

impl ProtoEncode for ServerToClientHandshake {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.jwt);
    }
}

impl ProtoDecode for ServerToClientHandshake {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            jwt: codec::read_string(buf)?,
        })
    }
}
