use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::address::WireAddress;
use crate::codec::ensure;
use crate::error::RakNetError;

/// Packet ids of connected control messages carried inside frames.
pub mod id {
    pub const CONNECTED_PING: u8 = 0x00;
    pub const CONNECTED_PONG: u8 = 0x03;
    pub const CONNECTION_REQUEST: u8 = 0x09;
    pub const CONNECTION_REQUEST_ACCEPTED: u8 = 0x10;
    pub const NEW_INCOMING_CONNECTION: u8 = 0x13;
    pub const DISCONNECTION_NOTIFICATION: u8 = 0x15;
}

/// Number of system addresses in the connection packets.
pub const NUM_SYSTEM_ADDRESSES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnlinePacket {
    ConnectedPing {
        timestamp: i64,
    },
    ConnectedPong {
        ping_timestamp: i64,
        pong_timestamp: i64,
    },
    ConnectionRequest {
        client_guid: i64,
        timestamp: i64,
        use_security: bool,
    },
    ConnectionRequestAccepted {
        client_address: WireAddress,
        system_index: u16,
        system_addresses: [WireAddress; NUM_SYSTEM_ADDRESSES],
        request_timestamp: i64,
        accept_timestamp: i64,
    },
    NewIncomingConnection {
        server_address: WireAddress,
        system_addresses: [WireAddress; NUM_SYSTEM_ADDRESSES],
        request_timestamp: i64,
        accept_timestamp: i64,
    },
    DisconnectionNotification,
}

/// Read the fixed-size system address list. Clients are known to send fewer
/// entries than announced, so missing entries stay unspecified.
fn read_system_addresses(
    buf: &mut impl Buf,
    trailer: usize,
) -> Result<[WireAddress; NUM_SYSTEM_ADDRESSES], RakNetError> {
    let mut addresses = [WireAddress::UNSPECIFIED; NUM_SYSTEM_ADDRESSES];
    for addr in &mut addresses {
        if buf.remaining() <= trailer {
            break;
        }
        *addr = WireAddress::decode(buf)?;
    }
    Ok(addresses)
}

fn read_timestamp(buf: &mut impl Buf) -> i64 {
    if buf.remaining() >= 8 {
        buf.get_i64()
    } else {
        0
    }
}

impl OnlinePacket {
    pub fn decode(data: &[u8]) -> Result<Self, RakNetError> {
        let mut buf = std::io::Cursor::new(data);
        ensure(&buf, 1)?;
        let packet_id = buf.get_u8();

        match packet_id {
            id::CONNECTED_PING => {
                ensure(&buf, 8)?;
                Ok(Self::ConnectedPing {
                    timestamp: buf.get_i64(),
                })
            }
            id::CONNECTED_PONG => {
                ensure(&buf, 16)?;
                Ok(Self::ConnectedPong {
                    ping_timestamp: buf.get_i64(),
                    pong_timestamp: buf.get_i64(),
                })
            }
            id::CONNECTION_REQUEST => {
                ensure(&buf, 17)?;
                Ok(Self::ConnectionRequest {
                    client_guid: buf.get_i64(),
                    timestamp: buf.get_i64(),
                    use_security: buf.get_u8() != 0,
                })
            }
            id::CONNECTION_REQUEST_ACCEPTED => {
                let client_address = WireAddress::decode(&mut buf)?;
                ensure(&buf, 2)?;
                let system_index = buf.get_u16();
                let system_addresses = read_system_addresses(&mut buf, 16)?;
                Ok(Self::ConnectionRequestAccepted {
                    client_address,
                    system_index,
                    system_addresses,
                    request_timestamp: read_timestamp(&mut buf),
                    accept_timestamp: read_timestamp(&mut buf),
                })
            }
            id::NEW_INCOMING_CONNECTION => {
                let server_address = WireAddress::decode(&mut buf)?;
                let system_addresses = read_system_addresses(&mut buf, 16)?;
                Ok(Self::NewIncomingConnection {
                    server_address,
                    system_addresses,
                    request_timestamp: read_timestamp(&mut buf),
                    accept_timestamp: read_timestamp(&mut buf),
                })
            }
            id::DISCONNECTION_NOTIFICATION => Ok(Self::DisconnectionNotification),
            _ => Err(RakNetError::UnknownPacketId(packet_id)),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::ConnectedPing { timestamp } => {
                buf.put_u8(id::CONNECTED_PING);
                buf.put_i64(*timestamp);
            }
            Self::ConnectedPong {
                ping_timestamp,
                pong_timestamp,
            } => {
                buf.put_u8(id::CONNECTED_PONG);
                buf.put_i64(*ping_timestamp);
                buf.put_i64(*pong_timestamp);
            }
            Self::ConnectionRequest {
                client_guid,
                timestamp,
                use_security,
            } => {
                buf.put_u8(id::CONNECTION_REQUEST);
                buf.put_i64(*client_guid);
                buf.put_i64(*timestamp);
                buf.put_u8(*use_security as u8);
            }
            Self::ConnectionRequestAccepted {
                client_address,
                system_index,
                system_addresses,
                request_timestamp,
                accept_timestamp,
            } => {
                buf.put_u8(id::CONNECTION_REQUEST_ACCEPTED);
                client_address.encode(buf);
                buf.put_u16(*system_index);
                for addr in system_addresses {
                    addr.encode(buf);
                }
                buf.put_i64(*request_timestamp);
                buf.put_i64(*accept_timestamp);
            }
            Self::NewIncomingConnection {
                server_address,
                system_addresses,
                request_timestamp,
                accept_timestamp,
            } => {
                buf.put_u8(id::NEW_INCOMING_CONNECTION);
                server_address.encode(buf);
                for addr in system_addresses {
                    addr.encode(buf);
                }
                buf.put_i64(*request_timestamp);
                buf.put_i64(*accept_timestamp);
            }
            Self::DisconnectionNotification => {
                buf.put_u8(id::DISCONNECTION_NOTIFICATION);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr(s: &str) -> WireAddress {
        s.parse::<SocketAddr>().unwrap().into()
    }

    #[test]
    fn connected_pong_layout() {
        let pong = OnlinePacket::ConnectedPong {
            ping_timestamp: 10,
            pong_timestamp: 20,
        };
        let bytes = pong.to_bytes();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], id::CONNECTED_PONG);
        assert_eq!(OnlinePacket::decode(&bytes).unwrap(), pong);
    }

    #[test]
    fn connection_request_accepted_decodes() {
        let mut system_addresses = [WireAddress::UNSPECIFIED; NUM_SYSTEM_ADDRESSES];
        system_addresses[0] = addr("10.0.0.2:50000");
        let accepted = OnlinePacket::ConnectionRequestAccepted {
            client_address: addr("10.0.0.2:50000"),
            system_index: 0,
            system_addresses,
            request_timestamp: 111,
            accept_timestamp: 222,
        };
        assert_eq!(OnlinePacket::decode(&accepted.to_bytes()).unwrap(), accepted);
    }

    #[test]
    fn new_incoming_connection_with_short_address_list() {
        let mut buf = BytesMut::new();
        buf.put_u8(id::NEW_INCOMING_CONNECTION);
        addr("127.0.0.1:19132").encode(&mut buf);
        addr("10.0.0.2:50000").encode(&mut buf);
        buf.put_i64(5);
        buf.put_i64(6);

        match OnlinePacket::decode(&buf).unwrap() {
            OnlinePacket::NewIncomingConnection {
                server_address,
                system_addresses,
                request_timestamp,
                accept_timestamp,
            } => {
                assert_eq!(server_address.port(), 19132);
                assert_eq!(system_addresses[0], addr("10.0.0.2:50000"));
                assert_eq!(system_addresses[1], WireAddress::UNSPECIFIED);
                assert_eq!((request_timestamp, accept_timestamp), (5, 6));
            }
            other => panic!("expected NewIncomingConnection, got {other:?}"),
        }
    }

    #[test]
    fn truncated_connection_request_rejected() {
        let data = [id::CONNECTION_REQUEST, 0, 0, 0];
        assert!(OnlinePacket::decode(&data).is_err());
    }

    #[test]
    fn disconnection_notification_is_one_byte() {
        let bytes = OnlinePacket::DisconnectionNotification.to_bytes();
        assert_eq!(&bytes[..], &[id::DISCONNECTION_NOTIFICATION]);
    }
}
