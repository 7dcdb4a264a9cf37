use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::address::WireAddress;
use crate::codec::{ensure, read_magic, read_string, write_magic, write_string};
use crate::constants::UDP_HEADER_SIZE;
use crate::error::RakNetError;

/// Packet ids of unconnected (offline) datagrams.
pub mod id {
    pub const UNCONNECTED_PING: u8 = 0x01;
    pub const UNCONNECTED_PING_OPEN: u8 = 0x02;
    pub const OPEN_CONNECTION_REQUEST_1: u8 = 0x05;
    pub const OPEN_CONNECTION_REPLY_1: u8 = 0x06;
    pub const OPEN_CONNECTION_REQUEST_2: u8 = 0x07;
    pub const OPEN_CONNECTION_REPLY_2: u8 = 0x08;
    pub const INCOMPATIBLE_PROTOCOL_VERSION: u8 = 0x19;
    pub const UNCONNECTED_PONG: u8 = 0x1C;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflinePacket {
    UnconnectedPing {
        send_timestamp: i64,
        client_guid: i64,
    },
    UnconnectedPong {
        send_timestamp: i64,
        server_guid: i64,
        motd: String,
    },
    /// `mtu_size` is the padded datagram length plus the IP/UDP header size.
    OpenConnectionRequest1 {
        protocol_version: u8,
        mtu_size: u16,
    },
    OpenConnectionReply1 {
        server_guid: i64,
        use_security: bool,
        mtu_size: u16,
    },
    OpenConnectionRequest2 {
        server_address: WireAddress,
        mtu_size: u16,
        client_guid: i64,
    },
    OpenConnectionReply2 {
        server_guid: i64,
        client_address: WireAddress,
        mtu_size: u16,
        encryption_enabled: bool,
    },
    IncompatibleProtocolVersion {
        protocol_version: u8,
        server_guid: i64,
    },
}

impl OfflinePacket {
    pub fn decode(data: &[u8]) -> Result<Self, RakNetError> {
        let mut buf = std::io::Cursor::new(data);
        ensure(&buf, 1)?;
        let packet_id = buf.get_u8();

        match packet_id {
            id::UNCONNECTED_PING | id::UNCONNECTED_PING_OPEN => {
                ensure(&buf, 8)?;
                let send_timestamp = buf.get_i64();
                read_magic(&mut buf)?;
                ensure(&buf, 8)?;
                let client_guid = buf.get_i64();
                Ok(Self::UnconnectedPing {
                    send_timestamp,
                    client_guid,
                })
            }
            id::UNCONNECTED_PONG => {
                ensure(&buf, 16)?;
                let send_timestamp = buf.get_i64();
                let server_guid = buf.get_i64();
                read_magic(&mut buf)?;
                let motd = read_string(&mut buf)?;
                Ok(Self::UnconnectedPong {
                    send_timestamp,
                    server_guid,
                    motd,
                })
            }
            id::OPEN_CONNECTION_REQUEST_1 => {
                read_magic(&mut buf)?;
                ensure(&buf, 1)?;
                let protocol_version = buf.get_u8();
                // the client pads this datagram up to its MTU minus the headers
                let mtu_size = (data.len() as u16).saturating_add(UDP_HEADER_SIZE);
                Ok(Self::OpenConnectionRequest1 {
                    protocol_version,
                    mtu_size,
                })
            }
            id::OPEN_CONNECTION_REPLY_1 => {
                read_magic(&mut buf)?;
                ensure(&buf, 11)?;
                let server_guid = buf.get_i64();
                let use_security = buf.get_u8() != 0;
                let mtu_size = buf.get_u16();
                Ok(Self::OpenConnectionReply1 {
                    server_guid,
                    use_security,
                    mtu_size,
                })
            }
            id::OPEN_CONNECTION_REQUEST_2 => {
                read_magic(&mut buf)?;
                let server_address = WireAddress::decode(&mut buf)?;
                ensure(&buf, 10)?;
                let mtu_size = buf.get_u16();
                let client_guid = buf.get_i64();
                Ok(Self::OpenConnectionRequest2 {
                    server_address,
                    mtu_size,
                    client_guid,
                })
            }
            id::OPEN_CONNECTION_REPLY_2 => {
                read_magic(&mut buf)?;
                ensure(&buf, 8)?;
                let server_guid = buf.get_i64();
                let client_address = WireAddress::decode(&mut buf)?;
                ensure(&buf, 3)?;
                let mtu_size = buf.get_u16();
                let encryption_enabled = buf.get_u8() != 0;
                Ok(Self::OpenConnectionReply2 {
                    server_guid,
                    client_address,
                    mtu_size,
                    encryption_enabled,
                })
            }
            id::INCOMPATIBLE_PROTOCOL_VERSION => {
                ensure(&buf, 1)?;
                let protocol_version = buf.get_u8();
                read_magic(&mut buf)?;
                ensure(&buf, 8)?;
                let server_guid = buf.get_i64();
                Ok(Self::IncompatibleProtocolVersion {
                    protocol_version,
                    server_guid,
                })
            }
            _ => Err(RakNetError::UnknownPacketId(packet_id)),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::UnconnectedPing {
                send_timestamp,
                client_guid,
            } => {
                buf.put_u8(id::UNCONNECTED_PING);
                buf.put_i64(*send_timestamp);
                write_magic(buf);
                buf.put_i64(*client_guid);
            }
            Self::UnconnectedPong {
                send_timestamp,
                server_guid,
                motd,
            } => {
                buf.put_u8(id::UNCONNECTED_PONG);
                buf.put_i64(*send_timestamp);
                buf.put_i64(*server_guid);
                write_magic(buf);
                write_string(buf, motd);
            }
            Self::OpenConnectionRequest1 {
                protocol_version,
                mtu_size,
            } => {
                let start = buf.len();
                buf.put_u8(id::OPEN_CONNECTION_REQUEST_1);
                write_magic(buf);
                buf.put_u8(*protocol_version);
                let padded = mtu_size.saturating_sub(UDP_HEADER_SIZE) as usize;
                if buf.len() - start < padded {
                    buf.resize(start + padded, 0);
                }
            }
            Self::OpenConnectionReply1 {
                server_guid,
                use_security,
                mtu_size,
            } => {
                buf.put_u8(id::OPEN_CONNECTION_REPLY_1);
                write_magic(buf);
                buf.put_i64(*server_guid);
                buf.put_u8(*use_security as u8);
                buf.put_u16(*mtu_size);
            }
            Self::OpenConnectionRequest2 {
                server_address,
                mtu_size,
                client_guid,
            } => {
                buf.put_u8(id::OPEN_CONNECTION_REQUEST_2);
                write_magic(buf);
                server_address.encode(buf);
                buf.put_u16(*mtu_size);
                buf.put_i64(*client_guid);
            }
            Self::OpenConnectionReply2 {
                server_guid,
                client_address,
                mtu_size,
                encryption_enabled,
            } => {
                buf.put_u8(id::OPEN_CONNECTION_REPLY_2);
                write_magic(buf);
                buf.put_i64(*server_guid);
                client_address.encode(buf);
                buf.put_u16(*mtu_size);
                buf.put_u8(*encryption_enabled as u8);
            }
            Self::IncompatibleProtocolVersion {
                protocol_version,
                server_guid,
            } => {
                buf.put_u8(id::INCOMPATIBLE_PROTOCOL_VERSION);
                buf.put_u8(*protocol_version);
                write_magic(buf);
                buf.put_i64(*server_guid);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Server advertisement carried in the UnconnectedPong.
#[derive(Debug, Clone)]
pub struct ServerMotd {
    pub edition: String,
    pub motd: String,
    pub protocol_version: u32,
    pub game_version: String,
    pub online_players: u32,
    pub max_players: u32,
    pub server_guid: i64,
    pub sub_name: String,
    pub gamemode: String,
    pub gamemode_numeric: u8,
    pub ipv4_port: u16,
    pub ipv6_port: u16,
}

impl ServerMotd {
    /// Semicolon-joined advertisement string, with a trailing separator.
    pub fn to_motd_string(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{};{};{};{};{};",
            self.edition,
            self.motd,
            self.protocol_version,
            self.game_version,
            self.online_players,
            self.max_players,
            self.server_guid,
            self.sub_name,
            self.gamemode,
            self.gamemode_numeric,
            self.ipv4_port,
            self.ipv6_port,
        )
    }
}
