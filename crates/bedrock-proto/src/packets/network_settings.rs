//! NetworkSettings (0x8F): the server's compression choice. Compression is
//! switched on right after this packet goes out.

use bytes::{Buf, BufMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::compression::CompressionAlgorithm;
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    pub compression_threshold: u16,
    pub compression_algorithm: CompressionAlgorithm,
    pub client_throttle_enabled: bool,
    pub client_throttle_threshold: u8,
    pub client_throttle_scalar: f32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            compression_threshold: 256,
            compression_algorithm: CompressionAlgorithm::Zlib,
            client_throttle_enabled: false,
            client_throttle_threshold: 0,
            client_throttle_scalar: 0.0,
        }
    }
}

impl ProtoEncode for NetworkSettings {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.compression_threshold);
        buf.put_u16_le(self.compression_algorithm.to_u16());
        buf.put_u8(self.client_throttle_enabled as u8);
        buf.put_u8(self.client_throttle_threshold);
        buf.put_f32_le(self.client_throttle_scalar);
    }
}

impl ProtoDecode for NetworkSettings {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ProtoError::ensure(buf, 10)?;
        Ok(Self {
            compression_threshold: buf.get_u16_le(),
            compression_algorithm: CompressionAlgorithm::from_u16(buf.get_u16_le())?,
            client_throttle_enabled: buf.get_u8() != 0,
            client_throttle_threshold: buf.get_u8(),
            client_throttle_scalar: buf.get_f32_le(),
        })
    }
}
