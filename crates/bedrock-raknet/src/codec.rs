use bytes::{Buf, BufMut};

use crate::constants::RAKNET_MAGIC;
use crate::error::RakNetError;

/// Fail with `PacketTooShort` unless `buf` holds at least `len` more bytes.
pub fn ensure(buf: &impl Buf, len: usize) -> Result<(), RakNetError> {
    if buf.remaining() < len {
        return Err(RakNetError::short(len, buf.remaining()));
    }
    Ok(())
}

/// Read a 24-bit unsigned integer in little-endian byte order.
pub fn read_u24_le(buf: &mut impl Buf) -> Result<u32, RakNetError> {
    ensure(buf, 3)?;
    let b0 = buf.get_u8() as u32;
    let b1 = buf.get_u8() as u32;
    let b2 = buf.get_u8() as u32;
    Ok(b0 | (b1 << 8) | (b2 << 16))
}

/// Write a 24-bit unsigned integer in little-endian byte order.
pub fn write_u24_le(buf: &mut impl BufMut, val: u32) {
    buf.put_u8((val & 0xFF) as u8);
    buf.put_u8(((val >> 8) & 0xFF) as u8);
    buf.put_u8(((val >> 16) & 0xFF) as u8);
}

/// Read the 16-byte offline magic and validate it.
pub fn read_magic(buf: &mut impl Buf) -> Result<(), RakNetError> {
    ensure(buf, 16)?;
    let mut magic = [0u8; 16];
    buf.copy_to_slice(&mut magic);
    if magic != RAKNET_MAGIC {
        return Err(RakNetError::InvalidMagic);
    }
    Ok(())
}

/// Write the 16-byte offline magic.
pub fn write_magic(buf: &mut impl BufMut) {
    buf.put_slice(&RAKNET_MAGIC);
}

/// Read a UTF-8 string prefixed by a u16 BE length.
pub fn read_string(buf: &mut impl Buf) -> Result<String, RakNetError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| RakNetError::InvalidUtf8)
}

/// Write a UTF-8 string prefixed by a u16 BE length.
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::io::Cursor;

    #[test]
    fn u24_le_layout() {
        let mut buf = BytesMut::new();
        write_u24_le(&mut buf, 0x0A0B0C);
        assert_eq!(&buf[..], &[0x0C, 0x0B, 0x0A]);
        let mut cursor = Cursor::new(&buf[..]);
        assert_eq!(read_u24_le(&mut cursor).unwrap(), 0x0A0B0C);
    }

    #[test]
    fn u24_truncated() {
        let mut cursor = Cursor::new(&[0x01u8, 0x02][..]);
        assert!(matches!(
            read_u24_le(&mut cursor),
            Err(RakNetError::PacketTooShort {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn magic_invalid() {
        let mut bad = RAKNET_MAGIC;
        bad[0] = 0xFF;
        let mut cursor = Cursor::new(&bad[..]);
        assert!(matches!(
            read_magic(&mut cursor),
            Err(RakNetError::InvalidMagic)
        ));
    }

    #[test]
    fn magic_truncated() {
        let mut cursor = Cursor::new(&RAKNET_MAGIC[..10]);
        assert!(read_magic(&mut cursor).is_err());
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "MCPE;Bedrock;");
        let mut cursor = Cursor::new(&buf[..]);
        assert_eq!(read_string(&mut cursor).unwrap(), "MCPE;Bedrock;");
    }

    #[test]
    fn string_length_exceeds_buffer() {
        let data = [0x00u8, 0x10, b'a', b'b'];
        let mut cursor = Cursor::new(&data[..]);
        assert!(read_string(&mut cursor).is_err());
    }
}
