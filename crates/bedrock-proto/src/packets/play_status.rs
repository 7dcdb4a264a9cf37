//! PlayStatus (0x02).

use bytes::{Buf, BufMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PlayStatusType {
    LoginSuccess = 0,
    /// Client is outdated.
    FailedClient = 1,
    /// Server is outdated.
    FailedServer = 2,
    PlayerSpawn = 3,
    FailedInvalidTenant = 4,
    FailedVanillaEdu = 5,
    FailedIncompatible = 6,
    FailedServerFull = 7,
}

impl TryFrom<i32> for PlayStatusType {
    type Error = ProtoError;

    fn try_from(code: i32) -> Result<Self, ProtoError> {
        Ok(match code {
            0 => Self::LoginSuccess,
            1 => Self::FailedClient,
            2 => Self::FailedServer,
            3 => Self::PlayerSpawn,
            4 => Self::FailedInvalidTenant,
            5 => Self::FailedVanillaEdu,
            6 => Self::FailedIncompatible,
            7 => Self::FailedServerFull,
            other => {
                return Err(ProtoError::InvalidData(format!(
                    "unknown PlayStatus code: {other}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayStatus {
    pub status: PlayStatusType,
}

impl PlayStatus {
    pub fn new(status: PlayStatusType) -> Self {
        Self { status }
    }
}

impl ProtoEncode for PlayStatus {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.status as i32);
    }
}

impl ProtoDecode for PlayStatus {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        ProtoError::ensure(buf, 4)?;
        Ok(Self {
            status: PlayStatusType::try_from(buf.get_i32())?,
        })
    }
}
