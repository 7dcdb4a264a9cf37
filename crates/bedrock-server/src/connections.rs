//! Per-connection network sessions, fed by RakNet events.

use std::collections::HashMap;
use std::net::SocketAddr;

use bedrock_proto::packets::Disconnect;
use bedrock_proto::BatchConfig;
use bedrock_raknet::{DisconnectReason, Priority, RakNetEvent, Reliability, ServerHandle};
use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::dispatcher::{Dispatcher, HandlerContext};
use crate::session::NetworkSession;

/// What the transport should do for a connection after a payload was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Payload(Bytes),
    Disconnect(String),
}

pub struct ConnectionHandler {
    sessions: HashMap<SocketAddr, NetworkSession>,
    dispatcher: Dispatcher,
    batch: BatchConfig,
}

impl ConnectionHandler {
    /// `batch` is the template every new session starts from.
    pub fn new(dispatcher: Dispatcher, batch: BatchConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            dispatcher,
            batch,
        }
    }

    #[cfg(test)]
    pub fn session(&self, addr: &SocketAddr) -> Option<&NetworkSession> {
        self.sessions.get(addr)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn on_connected(&mut self, addr: SocketAddr) {
        self.sessions
            .insert(addr, NetworkSession::new(addr, self.batch.clone()));
    }

    pub fn on_disconnected(&mut self, addr: SocketAddr, reason: &DisconnectReason) {
        if let Some(session) = self.sessions.remove(&addr) {
            match &session.login.identity {
                Some(identity) => {
                    info!("{} ({addr}) disconnected: {reason}", identity.display_name)
                }
                None => info!("{addr} disconnected: {reason}"),
            }
        }
    }

    /// Decode a RakNet payload, dispatch every packet in it and collect the
    /// replies. A session that asks to close is dropped here, so anything
    /// still in flight from that peer is ignored.
    pub fn on_packet(&mut self, addr: SocketAddr, payload: Bytes) -> Vec<Outbound> {
        let Some(session) = self.sessions.get_mut(&addr) else {
            trace!("payload from {addr} without a session");
            return Vec::new();
        };

        let packets = match session.decode_inbound(payload) {
            Ok(packets) => packets,
            Err(e) => {
                return match e.disconnect_message() {
                    Some(message) => {
                        warn!("Closing {addr}: {e}");
                        let mut out: Vec<Outbound> =
                            farewell(session, &mut self.dispatcher, message)
                                .into_iter()
                                .collect();
                        self.sessions.remove(&addr);
                        out.push(Outbound::Disconnect(message.into()));
                        out
                    }
                    None => {
                        debug!("Dropping payload from {addr}: {e}");
                        Vec::new()
                    }
                };
            }
        };

        let mut out = Vec::new();
        let mut close = None;
        for packet in packets {
            let mut ctx = HandlerContext::new(addr, &mut session.login);
            self.dispatcher.dispatch(&packet, &mut ctx);
            let actions = ctx.into_actions();

            match session.apply(actions, &mut self.dispatcher) {
                Ok(applied) => {
                    out.extend(applied.payloads.into_iter().map(Outbound::Payload));
                    if applied.disconnect.is_some() {
                        close = applied.disconnect;
                        break;
                    }
                }
                Err(e) => {
                    warn!("Closing {addr}: {e}");
                    let message = e.disconnect_message().unwrap_or("Internal error");
                    out.extend(farewell(session, &mut self.dispatcher, message));
                    close = Some(message.into());
                    break;
                }
            }
        }

        if let Some(reason) = close {
            self.sessions.remove(&addr);
            out.push(Outbound::Disconnect(reason));
        }
        out
    }

    pub async fn handle_event(&mut self, event: RakNetEvent, handle: &ServerHandle) {
        match event {
            RakNetEvent::Connected { addr, guid } => {
                self.on_connected(addr);
                info!("{addr} connected (guid {guid}), {} online", self.session_count());
            }
            RakNetEvent::Disconnected { addr, reason } => self.on_disconnected(addr, &reason),
            RakNetEvent::Packet { addr, payload } => {
                for outbound in self.on_packet(addr, payload) {
                    match outbound {
                        Outbound::Payload(payload) => {
                            handle
                                .send_to(
                                    addr,
                                    payload,
                                    Reliability::ReliableOrdered,
                                    0,
                                    Priority::Normal,
                                )
                                .await
                        }
                        Outbound::Disconnect(reason) => handle.disconnect(addr, reason).await,
                    }
                }
            }
            RakNetEvent::Receipt { addr, receipt } => trace!("{addr} acknowledged {receipt:?}"),
        }
    }
}

/// The Disconnect game packet telling the client why it is being closed.
/// Nothing is sent when the session can no longer encode.
fn farewell(
    session: &mut NetworkSession,
    dispatcher: &mut Dispatcher,
    message: &str,
) -> Option<Outbound> {
    let packet = Disconnect::with_message(message).into();
    match session.encode_outbound(vec![packet], dispatcher) {
        Ok(payload) => payload.map(Outbound::Payload),
        Err(e) => {
            debug!("Disconnect for {} not sent: {e}", session.addr());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use base64::Engine;
    use bedrock_crypto::{derive_key, parse_public_key, PacketEncryption, ServerKeyPair};
    use bedrock_proto::compression::MAX_DECOMPRESSED_SIZE;
    use bedrock_proto::jwt::decode_jwt_unverified;
    use bedrock_proto::packets::{
        ClientToServerHandshake, Login, PlayStatus, PlayStatusType, RequestNetworkSettings,
        PROTOCOL_VERSION,
    };
    use bedrock_proto::{CompressionAlgorithm, GamePacket};

    use super::*;
    use crate::login::{self, NegotiationSettings};

    fn addr() -> SocketAddr {
        "192.168.1.20:51000".parse().unwrap()
    }

    fn batch() -> BatchConfig {
        BatchConfig {
            compression: CompressionAlgorithm::Zlib,
            compression_level: 7,
            compression_threshold: 0,
            compression_enabled: false,
            max_packets: 8,
            max_decompressed_size: MAX_DECOMPRESSED_SIZE,
        }
    }

    fn handler(encryption: bool) -> ConnectionHandler {
        let mut dispatcher = Dispatcher::new();
        login::register(
            &mut dispatcher,
            &NegotiationSettings {
                compression: CompressionAlgorithm::Zlib,
                compression_threshold: 0,
                encryption,
            },
        );
        let mut handler = ConnectionHandler::new(dispatcher, batch());
        handler.on_connected(addr());
        handler
    }

    /// The client end of a session, reusing the server's codec.
    struct Client {
        codec: NetworkSession,
        hooks: Dispatcher,
        key: ServerKeyPair,
    }

    impl Client {
        fn new() -> Self {
            Self {
                codec: NetworkSession::new(addr(), batch()),
                hooks: Dispatcher::new(),
                key: ServerKeyPair::generate(),
            }
        }

        fn payload(&mut self, packet: impl Into<GamePacket>) -> Bytes {
            self.codec
                .encode_outbound(vec![packet.into()], &mut self.hooks)
                .unwrap()
                .unwrap()
        }

        fn read(&mut self, out: &Outbound) -> Vec<GamePacket> {
            let Outbound::Payload(payload) = out else {
                panic!("expected a payload, got {out:?}");
            };
            self.codec.decode_inbound(payload.clone()).unwrap()
        }

        fn login(&self) -> Login {
            let header = serde_json::json!({ "alg": "ES384", "x5u": "unused" });
            let claims = serde_json::json!({
                "extraData": {
                    "XUID": "2535412345678901",
                    "identity": "3a1f6e1c-64d0-4c0e-9d3b-6f3c1f0a2b7d",
                    "displayName": "Alex"
                },
                "identityPublicKey": self.key.public_key_base64().unwrap()
            });
            let part = |v: &serde_json::Value| URL_SAFE_NO_PAD.encode(v.to_string());
            Login {
                protocol_version: PROTOCOL_VERSION,
                chain: vec![format!("{}.{}.sig", part(&header), part(&claims))],
                client_data_jwt: String::new(),
            }
        }

        /// Derive the shared key from the server's handshake JWT.
        fn finish_handshake(&mut self, jwt: &str) {
            let (header, claims) = decode_jwt_unverified(jwt).unwrap();
            let server_key = parse_public_key(&header.x5u.unwrap()).unwrap();
            let salt: [u8; 16] = STANDARD
                .decode(claims["salt"].as_str().unwrap())
                .unwrap()
                .try_into()
                .unwrap();
            let (key, iv) = derive_key(&salt, &self.key.shared_secret(&server_key));
            self.codec
                .enable_encryption(PacketEncryption::new(&key, &iv))
                .unwrap();
        }
    }

    #[test]
    fn full_encrypted_login() {
        let mut server = handler(true);
        let mut client = Client::new();

        let request = client.payload(RequestNetworkSettings {
            protocol_version: PROTOCOL_VERSION,
        });
        let out = server.on_packet(addr(), request);
        assert_eq!(out.len(), 1);
        let reply = client.read(&out[0]);
        assert!(matches!(&reply[0], GamePacket::NetworkSettings(s)
            if s.compression_algorithm == CompressionAlgorithm::Zlib));
        client.codec.enable_compression();
        assert!(server.session(&addr()).unwrap().compression_enabled());

        let login = client.login();
        let login = client.payload(login);
        let out = server.on_packet(addr(), login);
        assert_eq!(out.len(), 1);
        let GamePacket::ServerToClientHandshake(handshake) = &client.read(&out[0])[0] else {
            panic!("expected ServerToClientHandshake");
        };
        client.finish_handshake(&handshake.jwt);
        let session = server.session(&addr()).unwrap();
        assert!(session.encryption_enabled());
        assert_eq!(session.login.identity.as_ref().unwrap().display_name, "Alex");

        let confirm = client.payload(ClientToServerHandshake);
        let out = server.on_packet(addr(), confirm);
        assert_eq!(
            client.read(&out[0]),
            vec![GamePacket::PlayStatus(PlayStatus::new(PlayStatusType::LoginSuccess))]
        );
    }

    #[test]
    fn tampered_checksum_disconnects() {
        let mut server = handler(true);
        let mut client = Client::new();

        let request = client.payload(RequestNetworkSettings {
            protocol_version: PROTOCOL_VERSION,
        });
        server.on_packet(addr(), request);
        client.codec.enable_compression();
        let login = client.login();
        let login = client.payload(login);
        let out = server.on_packet(addr(), login);
        let GamePacket::ServerToClientHandshake(handshake) = &client.read(&out[0])[0] else {
            panic!("expected ServerToClientHandshake");
        };
        client.finish_handshake(&handshake.jwt);

        let mut bad = client.payload(ClientToServerHandshake).to_vec();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let out = server.on_packet(addr(), Bytes::from(bad));
        assert_eq!(out.len(), 2);
        assert_eq!(
            client.read(&out[0]),
            vec![GamePacket::Disconnect(Disconnect::with_message(
                "Invalid packet checksum"
            ))]
        );
        assert_eq!(out[1], Outbound::Disconnect("Invalid packet checksum".into()));
        assert!(server.session(&addr()).is_none());
    }

    #[test]
    fn unencrypted_login_succeeds_directly() {
        let mut server = handler(false);
        let mut client = Client::new();

        let request = client.payload(RequestNetworkSettings {
            protocol_version: PROTOCOL_VERSION,
        });
        server.on_packet(addr(), request);
        client.codec.enable_compression();

        let login = client.login();
        let login = client.payload(login);
        let out = server.on_packet(addr(), login);
        assert_eq!(
            client.read(&out[0]),
            vec![GamePacket::PlayStatus(PlayStatus::new(PlayStatusType::LoginSuccess))]
        );
        assert!(!server.session(&addr()).unwrap().encryption_enabled());
    }

    #[test]
    fn protocol_mismatch_closes_after_status() {
        let mut server = handler(true);
        let mut client = Client::new();

        let request = client.payload(RequestNetworkSettings {
            protocol_version: 100,
        });
        let out = server.on_packet(addr(), request);
        assert_eq!(out.len(), 2);
        assert_eq!(
            client.read(&out[0]),
            vec![GamePacket::PlayStatus(PlayStatus::new(PlayStatusType::FailedClient))]
        );
        assert_eq!(out[1], Outbound::Disconnect("Outdated client".into()));
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn oversized_batch_disconnects() {
        let mut server = handler(true);
        let mut client = Client::new();

        let packets = vec![GamePacket::from(ClientToServerHandshake); 9];
        let payload = client
            .codec
            .encode_outbound(packets, &mut client.hooks)
            .unwrap()
            .unwrap();
        let out = server.on_packet(addr(), payload);
        assert_eq!(out.len(), 2);
        let GamePacket::Disconnect(disconnect) = &client.read(&out[0])[0] else {
            panic!("expected Disconnect");
        };
        assert_eq!(disconnect.message, "Too many packets in one batch");
        assert!(!disconnect.hide_disconnect_screen);
        assert_eq!(
            out[1],
            Outbound::Disconnect("Too many packets in one batch".into())
        );
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn missing_marker_is_dropped_quietly() {
        let mut server = handler(true);
        let out = server.on_packet(addr(), Bytes::from_static(&[0x01, 0x02]));
        assert!(out.is_empty());
        assert_eq!(server.session_count(), 1);
    }

    #[test]
    fn unknown_peer_is_ignored() {
        let mut server = handler(true);
        let stranger: SocketAddr = "10.9.9.9:1".parse().unwrap();
        assert!(server
            .on_packet(stranger, Bytes::from_static(&[0xFE]))
            .is_empty());
    }

    #[test]
    fn disconnect_removes_session() {
        let mut server = handler(true);
        server.on_disconnected(addr(), &DisconnectReason::ClientDisconnect);
        assert_eq!(server.session_count(), 0);
    }
}
