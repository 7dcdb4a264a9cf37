//! Protocol encoding/decoding traits and helpers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtoError;
use crate::types::VarUInt32;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut);

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.proto_encode(&mut buf);
        buf.freeze()
    }
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Write a Bedrock protocol string (VarUInt32 length + UTF-8).
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    VarUInt32(s.len() as u32).proto_encode(buf);
    buf.put_slice(s.as_bytes());
}

/// Read a Bedrock protocol string (VarUInt32 length + UTF-8).
pub fn read_string(buf: &mut impl Buf) -> Result<String, ProtoError> {
    let len = VarUInt32::proto_decode(buf)?.0 as usize;
    ProtoError::ensure(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| ProtoError::InvalidUtf8)
}

/// Write a little-endian i32 length followed by the raw bytes.
pub fn write_le_prefixed(buf: &mut impl BufMut, data: &[u8]) {
    buf.put_i32_le(data.len() as i32);
    buf.put_slice(data);
}

/// Read a little-endian i32 length followed by that many bytes.
pub fn read_le_prefixed(buf: &mut impl Buf) -> Result<Bytes, ProtoError> {
    ProtoError::ensure(buf, 4)?;
    let len = buf.get_i32_le();
    let len = usize::try_from(len)
        .map_err(|_| ProtoError::InvalidData(format!("negative length {len}")))?;
    ProtoError::ensure(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}
