//! RequestNetworkSettings (0xC1): the client's first game packet.

use bytes::{Buf, BufMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestNetworkSettings {
    /// Big-endian on the wire, unlike most game fields.
    pub protocol_version: i32,
}

impl ProtoEncode for RequestNetworkSettings {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.protocol_version);
    }
}

impl ProtoDecode for RequestNetworkSettings {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ProtoError::ensure(buf, 4)?;
        Ok(Self {
            protocol_version: buf.get_i32(),
        })
    }
}
