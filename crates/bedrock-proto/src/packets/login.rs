//! Login (0x01): protocol version plus the identity chain and client data.
//!
//! ```text
//! i32 BE     protocol_version
//! VarUInt32  payload length
//!   i32 LE + bytes   connection request JSON (the chain)
//!   i32 LE + bytes   client data JWT
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{self, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::jwt;
use crate::types::VarUInt32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub protocol_version: i32,
    pub chain: Vec<String>,
    pub client_data_jwt: String,
}

impl ProtoEncode for Login {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        let request = serde_json::json!({ "chain": self.chain }).to_string();
        let mut payload = BytesMut::new();
        codec::write_le_prefixed(&mut payload, request.as_bytes());
        codec::write_le_prefixed(&mut payload, self.client_data_jwt.as_bytes());

        buf.put_i32(self.protocol_version);
        VarUInt32(payload.len() as u32).proto_encode(buf);
        buf.put_slice(&payload);
    }
}

impl ProtoDecode for Login {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ProtoError::ensure(buf, 4)?;
        let protocol_version = buf.get_i32();

        let payload_len = VarUInt32::proto_decode(buf)?.0 as usize;
        ProtoError::ensure(buf, payload_len)?;
        let mut payload = buf.copy_to_bytes(payload_len);

        let chain = jwt::parse_chain(&codec::read_le_prefixed(&mut payload)?)?;
        let client_data = codec::read_le_prefixed(&mut payload)?;
        let client_data_jwt =
            String::from_utf8(client_data.to_vec()).map_err(|_| ProtoError::InvalidUtf8)?;

        Ok(Self {
            protocol_version,
            chain,
            client_data_jwt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_own_encoding() {
        let login = Login {
            protocol_version: 924,
            chain: vec!["jwt1.p.s".into(), "jwt2.p.s".into(), "jwt3.p.s".into()],
            client_data_jwt: "client.jwt.data".into(),
        };
        let decoded = Login::proto_decode(&mut login.to_bytes()).unwrap();
        assert_eq!(decoded, login);
    }

    #[test]
    fn truncated() {
        assert!(Login::proto_decode(&mut &[0x00, 0x00, 0x03][..]).is_err());
    }

    #[test]
    fn payload_length_exceeds_buffer() {
        let mut buf = BytesMut::new();
        buf.put_i32(924);
        VarUInt32(100).proto_encode(&mut buf);
        buf.put_slice(b"short");
        assert!(matches!(
            Login::proto_decode(&mut buf.freeze()),
            Err(ProtoError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn missing_chain_key() {
        let mut payload = BytesMut::new();
        codec::write_le_prefixed(&mut payload, br#"{"notchain":[]}"#);
        codec::write_le_prefixed(&mut payload, b"cd");
        let mut buf = BytesMut::new();
        buf.put_i32(924);
        VarUInt32(payload.len() as u32).proto_encode(&mut buf);
        buf.put_slice(&payload);
        assert!(Login::proto_decode(&mut buf.freeze()).is_err());
    }
}
