use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::address::WireAddress;
use crate::connection::Connection;
use crate::constants::RAKNET_PROTOCOL_VERSION;
use crate::error::RakNetError;
use crate::packet::offline::{OfflinePacket, ServerMotd};

/// What the handshake needs to know about existing connections.
pub trait PeerTable {
    fn contains(&self, addr: &SocketAddr) -> bool;
    /// Connections in the table, in any state.
    fn len(&self) -> usize;
    /// Connections that completed the online handshake.
    fn connected(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerTable for HashMap<SocketAddr, Connection> {
    fn contains(&self, addr: &SocketAddr) -> bool {
        self.contains_key(addr)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn connected(&self) -> usize {
        self.values().filter(|c| c.is_connected()).count()
    }
}

/// A connection the caller should create after sending the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRequest {
    pub guid: i64,
    pub mtu: u16,
}

#[derive(Debug, Default)]
pub struct HandshakeOutcome {
    pub reply: Option<Bytes>,
    pub open: Option<OpenRequest>,
}

impl HandshakeOutcome {
    fn reply(packet: OfflinePacket) -> Self {
        Self {
            reply: Some(packet.to_bytes()),
            open: None,
        }
    }

    fn ignore() -> Self {
        Self::default()
    }
}

/// Answers unconnected datagrams. Holds configuration only; all per-peer
/// state lives in the transport's connection table.
pub struct Handshake {
    server_guid: i64,
    bound_port: u16,
    min_mtu: u16,
    max_mtu: u16,
    max_connections: usize,
    motd: ServerMotd,
}

impl Handshake {
    pub fn new(
        server_guid: i64,
        bound_port: u16,
        min_mtu: u16,
        max_mtu: u16,
        max_connections: usize,
        motd: ServerMotd,
    ) -> Self {
        Self {
            server_guid,
            bound_port,
            min_mtu,
            max_mtu,
            max_connections,
            motd,
        }
    }

    pub fn motd(&self) -> &ServerMotd {
        &self.motd
    }

    pub fn set_motd(&mut self, motd: ServerMotd) {
        self.motd = motd;
    }

    /// Decode one unconnected datagram and build the answer, if any.
    /// Malformed input is an error; policy rejections are logged and
    /// produce an empty outcome.
    pub fn respond(
        &self,
        datagram: &[u8],
        from: SocketAddr,
        peers: &dyn PeerTable,
    ) -> Result<HandshakeOutcome, RakNetError> {
        let packet = OfflinePacket::decode(datagram)?;
        match packet {
            OfflinePacket::UnconnectedPing { send_timestamp, .. } => {
                let mut motd = self.motd.clone();
                motd.online_players = peers.connected() as u32;
                motd.server_guid = self.server_guid;
                Ok(HandshakeOutcome::reply(OfflinePacket::UnconnectedPong {
                    send_timestamp,
                    server_guid: self.server_guid,
                    motd: motd.to_motd_string(),
                }))
            }
            OfflinePacket::OpenConnectionRequest1 {
                protocol_version,
                mtu_size,
            } => {
                if let Err(e) = check_protocol(protocol_version) {
                    debug!("OCR1 from {from} rejected: {e}");
                    return Ok(HandshakeOutcome::reply(
                        OfflinePacket::IncompatibleProtocolVersion {
                            protocol_version: RAKNET_PROTOCOL_VERSION,
                            server_guid: self.server_guid,
                        },
                    ));
                }
                let mtu = mtu_size.min(self.max_mtu);
                trace!("OCR1 from {from}: MTU {mtu_size} -> {mtu}");
                Ok(HandshakeOutcome::reply(OfflinePacket::OpenConnectionReply1 {
                    server_guid: self.server_guid,
                    use_security: false,
                    mtu_size: mtu,
                }))
            }
            OfflinePacket::OpenConnectionRequest2 {
                server_address,
                mtu_size,
                client_guid,
            } => Ok(self.open_connection(from, server_address, mtu_size, client_guid, peers)),
            other => {
                trace!("ignoring offline packet {other:?} from {from}");
                Ok(HandshakeOutcome::ignore())
            }
        }
    }

    fn open_connection(
        &self,
        from: SocketAddr,
        server_address: WireAddress,
        mtu: u16,
        client_guid: i64,
        peers: &dyn PeerTable,
    ) -> HandshakeOutcome {
        if server_address.port() != self.bound_port {
            info!(
                "OCR2 from {from} rejected: port {} is not the bound port {}",
                server_address.port(),
                self.bound_port
            );
            return HandshakeOutcome::ignore();
        }
        if mtu < self.min_mtu || mtu > self.max_mtu {
            let e = RakNetError::MtuOutOfRange(mtu);
            info!(
                "OCR2 from {from} rejected: {e}, allowed [{}, {}]",
                self.min_mtu, self.max_mtu
            );
            return HandshakeOutcome::ignore();
        }
        if peers.contains(&from) {
            info!("OCR2 from {from} rejected: already connected");
            return HandshakeOutcome::ignore();
        }
        if peers.len() >= self.max_connections {
            info!("OCR2 from {from} rejected: connection table full");
            return HandshakeOutcome::ignore();
        }

        debug!("OCR2 from {from}: guid {client_guid}, MTU {mtu}");
        HandshakeOutcome {
            reply: Some(
                OfflinePacket::OpenConnectionReply2 {
                    server_guid: self.server_guid,
                    client_address: WireAddress::from(from),
                    mtu_size: mtu,
                    encryption_enabled: false,
                }
                .to_bytes(),
            ),
            open: Some(OpenRequest {
                guid: client_guid,
                mtu,
            }),
        }
    }
}

fn check_protocol(version: u8) -> Result<(), RakNetError> {
    if version != RAKNET_PROTOCOL_VERSION {
        return Err(RakNetError::IncompatibleProtocol {
            expected: RAKNET_PROTOCOL_VERSION,
            got: version,
        });
    }
    Ok(())
}
