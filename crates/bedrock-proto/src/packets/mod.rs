//! Game packets exchanged while a client negotiates and logs in.

pub mod client_to_server_handshake;
pub mod disconnect;
pub mod login;
pub mod network_settings;
pub mod play_status;
pub mod request_network_settings;
pub mod server_to_client_handshake;

use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::VarUInt32;

pub use client_to_server_handshake::ClientToServerHandshake;
pub use disconnect::Disconnect;
pub use login::Login;
pub use network_settings::NetworkSettings;
pub use play_status::{PlayStatus, PlayStatusType};
pub use request_network_settings::RequestNetworkSettings;
pub use server_to_client_handshake::ServerToClientHandshake;

/// Game packet IDs.
pub mod id {
    pub const LOGIN: u32 = 0x01;
    pub const PLAY_STATUS: u32 = 0x02;
    pub const SERVER_TO_CLIENT_HANDSHAKE: u32 = 0x03;
    pub const CLIENT_TO_SERVER_HANDSHAKE: u32 = 0x04;
    pub const DISCONNECT: u32 = 0x05;
    pub const NETWORK_SETTINGS: u32 = 0x8F;
    pub const REQUEST_NETWORK_SETTINGS: u32 = 0xC1;
}

/// Protocol spoken by this server (Minecraft Bedrock 1.26.0).
pub const PROTOCOL_VERSION: i32 = 924;

pub fn is_supported_version(v: i32) -> bool {
    v == PROTOCOL_VERSION
}

/// The varint that opens every packet in a batch: a 10-bit packet id and
/// two 2-bit split-screen sub-client ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: u32,
    pub sender_sub_client: u8,
    pub target_sub_client: u8,
}

impl PacketHeader {
    const ID_MASK: u32 = 0x3FF;

    pub fn new(id: u32) -> Self {
        Self {
            id,
            sender_sub_client: 0,
            target_sub_client: 0,
        }
    }
}

impl ProtoEncode for PacketHeader {
    fn proto_encode(&self, buf: &mut impl bytes::BufMut) {
        let raw = (self.id & Self::ID_MASK)
            | (u32::from(self.sender_sub_client & 0x03) << 10)
            | (u32::from(self.target_sub_client & 0x03) << 12);
        VarUInt32(raw).proto_encode(buf);
    }
}

impl ProtoDecode for PacketHeader {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let raw = VarUInt32::proto_decode(buf)?.0;
        Ok(Self {
            id: raw & Self::ID_MASK,
            sender_sub_client: ((raw >> 10) & 0x03) as u8,
            target_sub_client: ((raw >> 12) & 0x03) as u8,
        })
    }
}

macro_rules! game_packets {
    ($($variant:ident = $id:path),+ $(,)?) => {
        /// A decoded game packet of one of the known kinds.
        #[derive(Debug, Clone, PartialEq)]
        pub enum GamePacket {
            $($variant($variant),)+
        }

        impl GamePacket {
            pub fn id(&self) -> u32 {
                match self {
                    $(Self::$variant(_) => $id,)+
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => stringify!($variant),)+
                }
            }

            /// Decode a packet body whose id was already read from the header.
            pub fn decode(id: u32, buf: &mut impl Buf) -> Result<Self, ProtoError> {
                match id {
                    $($id => Ok(Self::$variant($variant::proto_decode(buf)?)),)+
                    other => Err(ProtoError::UnknownPacketId(other)),
                }
            }

            fn encode_body(&self, buf: &mut BytesMut) {
                match self {
                    $(Self::$variant(pkt) => pkt.proto_encode(buf),)+
                }
            }
        }

        $(
            impl From<$variant> for GamePacket {
                fn from(pkt: $variant) -> Self {
                    Self::$variant(pkt)
                }
            }
        )+
    };
}

game_packets! {
    Login = id::LOGIN,
    PlayStatus = id::PLAY_STATUS,
    ServerToClientHandshake = id::SERVER_TO_CLIENT_HANDSHAKE,
    ClientToServerHandshake = id::CLIENT_TO_SERVER_HANDSHAKE,
    Disconnect = id::DISCONNECT,
    NetworkSettings = id::NETWORK_SETTINGS,
    RequestNetworkSettings = id::REQUEST_NETWORK_SETTINGS,
}

impl GamePacket {
    /// Header plus body, ready to be placed in a batch.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        PacketHeader::new(self.id()).proto_encode(&mut buf);
        self.encode_body(&mut buf);
        buf.freeze()
    }

    /// Decode one batch entry.
    pub fn from_bytes(mut data: Bytes) -> Result<(PacketHeader, GamePacket), ProtoError> {
        let header = PacketHeader::proto_decode(&mut data)?;
        let packet = Self::decode(header.id, &mut data)?;
        Ok((header, packet))
    }
}
