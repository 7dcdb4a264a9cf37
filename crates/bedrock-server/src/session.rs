//! The game-packet layer of one connection: batching, compression and
//! encryption between RakNet payloads and typed [`GamePacket`]s.

use std::net::SocketAddr;

use bedrock_crypto::PacketEncryption;
use bedrock_proto::batch::{decode_batch, encode_batch};
use bedrock_proto::jwt::LoginIdentity;
use bedrock_proto::{BatchConfig, GamePacket, ProtoError};
use bedrock_raknet::constants::GAME_PACKET_ID;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    AwaitingNetworkSettings,
    AwaitingLogin,
    /// ServerToClientHandshake sent; encryption is already on.
    AwaitingHandshake,
    LoggedIn,
}

/// Negotiation progress, visible to packet handlers.
#[derive(Debug)]
pub struct LoginProgress {
    pub state: LoginState,
    pub protocol_version: Option<i32>,
    pub identity: Option<LoginIdentity>,
}

impl Default for LoginProgress {
    fn default() -> Self {
        Self {
            state: LoginState::AwaitingNetworkSettings,
            protocol_version: None,
            identity: None,
        }
    }
}

/// An effect queued by a handler, applied by the session in order.
pub enum SessionAction {
    Send(GamePacket),
    EnableCompression,
    EnableEncryption(Box<PacketEncryption>),
    Disconnect(String),
}

pub struct NetworkSession {
    addr: SocketAddr,
    batch: BatchConfig,
    encryption: Option<PacketEncryption>,
    pub login: LoginProgress,
}

impl NetworkSession {
    /// `batch` carries the configured algorithm and limits; compression is
    /// forced off until negotiated.
    pub fn new(addr: SocketAddr, mut batch: BatchConfig) -> Self {
        batch.compression_enabled = false;
        Self {
            addr,
            batch,
            encryption: None,
            login: LoginProgress::default(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[cfg(test)]
    pub fn compression_enabled(&self) -> bool {
        self.batch.compression_enabled
    }

    #[cfg(test)]
    pub fn encryption_enabled(&self) -> bool {
        self.encryption.is_some()
    }

    /// One-way: there is no call to turn it back off.
    pub fn enable_compression(&mut self) {
        if !self.batch.compression_enabled {
            self.batch.compression_enabled = true;
            debug!("Compression enabled for {} ({:?})", self.addr, self.batch.compression);
        }
    }

    pub fn enable_encryption(&mut self, encryption: PacketEncryption) -> Result<(), SessionError> {
        if self.encryption.is_some() {
            return Err(SessionError::AlreadyEncrypted);
        }
        self.encryption = Some(encryption);
        info!("Encryption enabled for {}", self.addr);
        Ok(())
    }

    /// Turn a RakNet payload into packets. Unknown packet ids are skipped;
    /// the caller disconnects on errors that carry a disconnect message.
    pub fn decode_inbound(&mut self, payload: Bytes) -> Result<Vec<GamePacket>, SessionError> {
        if payload.first() != Some(&GAME_PACKET_ID) {
            return Err(SessionError::MissingMarker);
        }
        let body = payload.slice(1..);
        let body = match self.encryption.as_mut() {
            Some(encryption) => encryption.decrypt(&body)?,
            None => body,
        };

        let mut packets = Vec::new();
        for entry in decode_batch(body, &self.batch)? {
            match GamePacket::from_bytes(entry) {
                Ok((_, packet)) => packets.push(packet),
                Err(ProtoError::UnknownPacketId(id)) => {
                    debug!("Skipping unknown packet 0x{id:02X} from {}", self.addr);
                }
                Err(e) => warn!("Undecodable packet from {}: {e}", self.addr),
            }
        }
        Ok(packets)
    }

    /// Build one RakNet payload from `packets`, dropping any a send hook
    /// cancels. Returns `None` when nothing is left to send.
    pub fn encode_outbound(
        &mut self,
        packets: Vec<GamePacket>,
        dispatcher: &mut Dispatcher,
    ) -> Result<Option<Bytes>, SessionError> {
        let encoded: Vec<Bytes> = packets
            .iter()
            .filter(|packet| dispatcher.allow_send(self.addr, packet))
            .map(GamePacket::encode)
            .collect();
        if encoded.is_empty() {
            return Ok(None);
        }

        let batch = encode_batch(&encoded, &self.batch)?;
        let body = match self.encryption.as_mut() {
            Some(encryption) => encryption.encrypt(&batch),
            None => batch,
        };

        let mut out = BytesMut::with_capacity(1 + body.len());
        out.put_u8(GAME_PACKET_ID);
        out.put_slice(&body);
        Ok(Some(out.freeze()))
    }

    /// Apply handler effects in order. Consecutive sends share one batch;
    /// a state change first flushes what was queued before it, so the
    /// packet that announces compression or encryption goes out without it.
    pub fn apply(
        &mut self,
        actions: Vec<SessionAction>,
        dispatcher: &mut Dispatcher,
    ) -> Result<Applied, SessionError> {
        let mut applied = Applied::default();
        let mut pending = Vec::new();

        for action in actions {
            match action {
                SessionAction::Send(packet) => pending.push(packet),
                SessionAction::EnableCompression => {
                    self.flush(&mut pending, dispatcher, &mut applied)?;
                    self.enable_compression();
                }
                SessionAction::EnableEncryption(encryption) => {
                    self.flush(&mut pending, dispatcher, &mut applied)?;
                    self.enable_encryption(*encryption)?;
                }
                SessionAction::Disconnect(reason) => {
                    self.flush(&mut pending, dispatcher, &mut applied)?;
                    applied.disconnect = Some(reason);
                    return Ok(applied);
                }
            }
        }
        self.flush(&mut pending, dispatcher, &mut applied)?;
        Ok(applied)
    }

    fn flush(
        &mut self,
        pending: &mut Vec<GamePacket>,
        dispatcher: &mut Dispatcher,
        applied: &mut Applied,
    ) -> Result<(), SessionError> {
        if pending.is_empty() {
            return Ok(());
        }
        if let Some(payload) = self.encode_outbound(std::mem::take(pending), dispatcher)? {
            applied.payloads.push(payload);
        }
        Ok(())
    }
}

/// Payloads to hand to RakNet, and whether to close afterwards.
#[derive(Debug, Default)]
pub struct Applied {
    pub payloads: Vec<Bytes>,
    pub disconnect: Option<String>,
}

#[cfg(test)]
mod tests {
    use bedrock_crypto::derive_key;
    use bedrock_proto::packets::{
        Disconnect, NetworkSettings, PlayStatus, PlayStatusType, RequestNetworkSettings,
    };
    use bedrock_proto::CompressionAlgorithm;

    use super::*;
    use crate::dispatcher::EventResult;

    fn addr() -> SocketAddr {
        "10.0.0.2:50000".parse().unwrap()
    }

    fn session() -> NetworkSession {
        NetworkSession::new(
            addr(),
            BatchConfig {
                compression: CompressionAlgorithm::Zlib,
                compression_threshold: 0,
                compression_enabled: true,
                ..BatchConfig::default()
            },
        )
    }

    fn cipher_pair() -> (PacketEncryption, PacketEncryption) {
        let (key, iv) = derive_key(&[7; 16], &[9; 48]);
        (PacketEncryption::new(&key, &iv), PacketEncryption::new(&key, &iv))
    }

    fn status() -> GamePacket {
        PlayStatus::new(PlayStatusType::LoginSuccess).into()
    }

    /// What a client would send before compression: 0xFE + raw batch.
    fn plain_payload(packets: &[GamePacket]) -> Bytes {
        let encoded: Vec<Bytes> = packets.iter().map(GamePacket::encode).collect();
        let batch = encode_batch(&encoded, &BatchConfig::default()).unwrap();
        let mut out = BytesMut::new();
        out.put_u8(GAME_PACKET_ID);
        out.put_slice(&batch);
        out.freeze()
    }

    #[test]
    fn new_session_starts_uncompressed() {
        let s = session();
        assert!(!s.compression_enabled());
        assert!(!s.encryption_enabled());
        assert_eq!(s.login.state, LoginState::AwaitingNetworkSettings);
    }

    #[test]
    fn missing_marker_is_malformed() {
        let mut s = session();
        let err = s.decode_inbound(Bytes::from_static(&[0x01, 0x02])).unwrap_err();
        assert!(matches!(err, SessionError::MissingMarker));
        assert!(err.disconnect_message().is_none());
        assert!(s.decode_inbound(Bytes::new()).is_err());
    }

    #[test]
    fn unknown_packets_are_skipped() {
        let mut s = session();
        let mut unknown = BytesMut::new();
        unknown.put_u8(0x90);
        unknown.put_u8(0x01);
        unknown.put_slice(&[1, 2, 3]);
        let known = status().encode();
        let batch = encode_batch(&[unknown.freeze(), known], &BatchConfig::default()).unwrap();
        let mut payload = BytesMut::new();
        payload.put_u8(GAME_PACKET_ID);
        payload.put_slice(&batch);

        let packets = s.decode_inbound(payload.freeze()).unwrap();
        assert_eq!(packets, vec![status()]);
    }

    #[test]
    fn ceiling_violation_disconnects() {
        let mut s = NetworkSession::new(
            addr(),
            BatchConfig {
                max_packets: 2,
                ..BatchConfig::default()
            },
        );
        let err = s
            .decode_inbound(plain_payload(&[status(), status(), status()]))
            .unwrap_err();
        assert_eq!(err.disconnect_message(), Some("Too many packets in one batch"));
    }

    #[test]
    fn compressed_outbound_has_method_byte() {
        let mut s = session();
        let mut dispatcher = Dispatcher::new();
        let plain = s
            .encode_outbound(vec![status()], &mut dispatcher)
            .unwrap()
            .unwrap();
        // Marker, then the length of the single entry.
        assert_eq!(plain[0], GAME_PACKET_ID);
        assert_eq!(plain[1] as usize, status().encode().len());

        s.enable_compression();
        let compressed = s
            .encode_outbound(vec![status()], &mut dispatcher)
            .unwrap()
            .unwrap();
        assert_eq!(compressed[0], GAME_PACKET_ID);
        assert_eq!(compressed[1], CompressionAlgorithm::Zlib.to_byte());
    }

    #[test]
    fn send_hook_can_cancel_everything() {
        let mut s = session();
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_send_hook(|_: SocketAddr, _: &GamePacket| EventResult::Cancelled);
        assert!(s
            .encode_outbound(vec![status()], &mut dispatcher)
            .unwrap()
            .is_none());
    }

    #[test]
    fn encrypted_round_trip_and_tamper_detection() {
        let (server_side, client_side) = cipher_pair();
        let mut server = session();
        server.enable_compression();
        server.enable_encryption(server_side).unwrap();
        assert!(matches!(
            server.enable_encryption(cipher_pair().0),
            Err(SessionError::AlreadyEncrypted)
        ));

        // Client encrypts two compressed batches.
        let mut client_cipher = client_side;
        let client_batch = BatchConfig {
            compression_threshold: 0,
            compression_enabled: true,
            ..BatchConfig::default()
        };
        let seal = |cipher: &mut PacketEncryption, packet: GamePacket| {
            let batch = encode_batch(&[packet.encode()], &client_batch).unwrap();
            let mut out = BytesMut::new();
            out.put_u8(GAME_PACKET_ID);
            out.put_slice(&cipher.encrypt(&batch));
            out.freeze()
        };

        let first = seal(&mut client_cipher, status());
        assert_eq!(server.decode_inbound(first).unwrap(), vec![status()]);

        let mut second = seal(&mut client_cipher, status()).to_vec();
        let last = second.len() - 1;
        second[last] ^= 0x40;
        let err = server.decode_inbound(Bytes::from(second)).unwrap_err();
        assert_eq!(err.disconnect_message(), Some("Invalid packet checksum"));
    }

    #[test]
    fn apply_flushes_before_state_changes() {
        let mut s = NetworkSession::new(addr(), BatchConfig::default());
        let mut dispatcher = Dispatcher::new();
        let settings: GamePacket = NetworkSettings::default().into();
        let applied = s
            .apply(
                vec![
                    SessionAction::Send(settings.clone()),
                    SessionAction::EnableCompression,
                    SessionAction::Send(status()),
                    SessionAction::Send(status()),
                ],
                &mut dispatcher,
            )
            .unwrap();
        assert!(s.compression_enabled());
        assert_eq!(applied.payloads.len(), 2);
        assert!(applied.disconnect.is_none());

        // The first payload is the uncompressed NetworkSettings batch.
        let mut client = NetworkSession::new(addr(), BatchConfig::default());
        assert_eq!(
            client.decode_inbound(applied.payloads[0].clone()).unwrap(),
            vec![settings]
        );
        // The second carries both statuses behind a method byte.
        client.enable_compression();
        assert_eq!(
            client.decode_inbound(applied.payloads[1].clone()).unwrap(),
            vec![status(), status()]
        );
    }

    #[test]
    fn apply_stops_at_disconnect() {
        let mut s = NetworkSession::new(addr(), BatchConfig::default());
        let mut dispatcher = Dispatcher::new();
        let applied = s
            .apply(
                vec![
                    SessionAction::Send(Disconnect::with_message("Outdated client").into()),
                    SessionAction::Disconnect("Outdated client".into()),
                    SessionAction::Send(
                        RequestNetworkSettings {
                            protocol_version: 1,
                        }
                        .into(),
                    ),
                ],
                &mut dispatcher,
            )
            .unwrap();
        assert_eq!(applied.payloads.len(), 1);
        assert_eq!(applied.disconnect.as_deref(), Some("Outdated client"));
    }
}
