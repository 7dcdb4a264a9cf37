//! Disconnect (0x05).

use bytes::{Buf, BufMut};

use crate::codec::{self, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::VarInt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: i32,
    /// When set the client shows no disconnect screen and no message is sent.
    pub hide_disconnect_screen: bool,
    pub message: String,
    pub filtered_message: String,
}

impl Disconnect {
    pub fn with_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            reason: 0,
            hide_disconnect_screen: false,
            filtered_message: message.clone(),
            message,
        }
    }

    pub fn silent() -> Self {
        Self {
            reason: 0,
            hide_disconnect_screen: true,
            message: String::new(),
            filtered_message: String::new(),
        }
    }
}

impl ProtoEncode for Disconnect {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        VarInt(self.reason).proto_encode(buf);
        buf.put_u8(self.hide_disconnect_screen as u8);
        if !self.hide_disconnect_screen {
            codec::write_string(buf, &self.message);
            codec::write_string(buf, &self.filtered_message);
        }
    }
}

impl ProtoDecode for Disconnect {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let reason = VarInt::proto_decode(buf)?.0;
        ProtoError::ensure(buf, 1)?;
        let hide_disconnect_screen = buf.get_u8() != 0;
        let (message, filtered_message) = if hide_disconnect_screen {
            (String::new(), String::new())
        } else {
            (codec::read_string(buf)?, codec::read_string(buf)?)
        };
        Ok(Self {
            reason,
            hide_disconnect_screen,
            message,
            filtered_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_is_two_bytes() {
        assert_eq!(&Disconnect::silent().to_bytes()[..], &[0x00, 0x01]);
    }

    #[test]
    fn message_is_sent_twice() {
        let pkt = Disconnect::with_message("Server closed");
        let buf = pkt.to_bytes();
        assert_eq!(buf.len(), 2 + 2 * (1 + "Server closed".len()));
        assert_eq!(Disconnect::proto_decode(&mut buf.clone()).unwrap(), pkt);
    }
}
