use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::address::WireAddress;
use crate::constants::GAME_PACKET_ID;
use crate::packet::ack::AckNack;
use crate::packet::frame::FrameSet;
use crate::packet::online::{OnlinePacket, NUM_SYSTEM_ADDRESSES};
use crate::packet::DatagramKind;
use crate::reliability::{Priority, Reliability};
use crate::session::{DeliveryReceipt, ReliabilitySession};

/// Lifecycle of a connection. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionStatus {
    /// OpenConnectionRequest2 accepted, waiting for NewIncomingConnection.
    Connecting,
    Connected,
    /// Disconnect started; the notification has been queued.
    Disconnecting,
    Disconnected,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a DisconnectionNotification.
    ClientDisconnect,
    /// No datagram arrived within the staleness window.
    TimedOut,
    /// The server asked for the disconnect.
    Kicked(String),
    ServerShutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnect => f.write_str("client disconnected"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Kicked(reason) => f.write_str(reason),
            Self::ServerShutdown => f.write_str("server shutting down"),
        }
    }
}

/// Per-connection timers taken from the transport configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimers {
    pub resend_timeout: Duration,
    pub staleness_timeout: Duration,
    pub ping_interval: Duration,
}

/// Something the owner of the connection needs to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    /// A game payload, still carrying its 0xFE marker.
    Packet(Bytes),
    Receipt(DeliveryReceipt),
    Disconnected(DisconnectReason),
}

/// One remote peer. Owns its reliability session; datagrams it wants written
/// are collected in an outbox that the transport drains.
pub struct Connection {
    addr: SocketAddr,
    guid: i64,
    status: ConnectionStatus,
    session: ReliabilitySession,
    timers: ConnectionTimers,
    created_at: Instant,
    last_activity: Instant,
    last_ping_sent: Instant,
    /// Sequence number carrying the latest ConnectedPing, and when it left.
    ping_probe: Option<(u32, Instant)>,
    ping: Option<Duration>,
    events: Vec<ConnectionEvent>,
}

impl Connection {
    pub fn new(
        addr: SocketAddr,
        guid: i64,
        mtu: u16,
        timers: ConnectionTimers,
        now: Instant,
    ) -> Self {
        Self {
            addr,
            guid,
            status: ConnectionStatus::Connecting,
            session: ReliabilitySession::new(mtu, timers.resend_timeout),
            timers,
            created_at: now,
            last_activity: now,
            last_ping_sent: now,
            ping_probe: None,
            ping: None,
            events: Vec::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn guid(&self) -> i64 {
        self.guid
    }

    pub fn mtu(&self) -> u16 {
        self.session.mtu()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Last measured round-trip time.
    pub fn ping(&self) -> Option<Duration> {
        self.ping
    }

    fn timestamp(&self, now: Instant) -> i64 {
        now.saturating_duration_since(self.created_at).as_millis() as i64
    }

    /// Queue a payload. Ignored once the connection is going away.
    pub fn send(
        &mut self,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        priority: Priority,
        now: Instant,
    ) -> Option<u32> {
        if self.status >= ConnectionStatus::Disconnecting {
            return None;
        }
        self.session.send(payload, reliability, channel, priority, now)
    }

    fn send_control(&mut self, packet: OnlinePacket, reliability: Reliability, now: Instant) {
        self.session
            .send(packet.to_bytes(), reliability, 0, Priority::Immediate, now);
    }

    /// Feed one connected datagram (FrameSet, ACK or NACK) from the peer.
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) {
        if self.status >= ConnectionStatus::Disconnecting || data.is_empty() {
            return;
        }
        self.last_activity = now;

        match DatagramKind::classify(data[0]) {
            DatagramKind::FrameSet => match FrameSet::decode(data) {
                Ok(frameset) => {
                    for payload in self.session.handle_frameset(frameset, now) {
                        self.handle_payload(payload, now);
                        if self.status >= ConnectionStatus::Disconnecting {
                            break;
                        }
                    }
                }
                Err(e) => trace!("dropping malformed FrameSet from {}: {e}", self.addr),
            },
            kind @ (DatagramKind::Ack | DatagramKind::Nack) => match AckNack::decode(data) {
                Ok(packet) => {
                    let sequences = packet.sequences();
                    self.resolve_ping(&sequences, now);
                    if kind == DatagramKind::Ack {
                        self.session.handle_ack(&sequences);
                    } else {
                        self.session.handle_nack(&sequences, now);
                    }
                    self.collect_receipts();
                }
                Err(e) => trace!("dropping malformed ACK/NACK from {}: {e}", self.addr),
            },
            DatagramKind::Offline => {
                trace!("offline datagram routed to connection {}", self.addr);
            }
        }
    }

    fn resolve_ping(&mut self, sequences: &[u32], now: Instant) {
        if let Some((seq, sent_at)) = self.ping_probe {
            if sequences.contains(&seq) {
                self.ping = Some(now.saturating_duration_since(sent_at));
                self.ping_probe = None;
            }
        }
    }

    fn collect_receipts(&mut self) {
        for receipt in self.session.drain_receipts() {
            self.events.push(ConnectionEvent::Receipt(receipt));
        }
    }

    fn handle_payload(&mut self, payload: Bytes, now: Instant) {
        let Some(&id) = payload.first() else {
            return;
        };
        if id == GAME_PACKET_ID {
            if self.is_connected() {
                self.events.push(ConnectionEvent::Packet(payload));
            } else {
                debug!("game packet from {} before connect, dropping", self.addr);
            }
            return;
        }

        let packet = match OnlinePacket::decode(&payload) {
            Ok(p) => p,
            Err(e) => {
                trace!("unhandled payload 0x{id:02X} from {}: {e}", self.addr);
                return;
            }
        };

        match packet {
            OnlinePacket::ConnectionRequest { timestamp, .. } => {
                let mut system_addresses = [WireAddress::UNSPECIFIED; NUM_SYSTEM_ADDRESSES];
                system_addresses[0] = WireAddress::from(self.addr);
                let accepted = OnlinePacket::ConnectionRequestAccepted {
                    client_address: WireAddress::from(self.addr),
                    system_index: 0,
                    system_addresses,
                    request_timestamp: timestamp,
                    accept_timestamp: self.timestamp(now),
                };
                self.send_control(accepted, Reliability::ReliableOrdered, now);
            }
            OnlinePacket::NewIncomingConnection { .. } => {
                if self.status == ConnectionStatus::Connecting {
                    self.status = ConnectionStatus::Connected;
                    info!("{} connected (guid {})", self.addr, self.guid);
                    self.events.push(ConnectionEvent::Connected);
                }
            }
            OnlinePacket::ConnectedPing { timestamp } => {
                let pong = OnlinePacket::ConnectedPong {
                    ping_timestamp: timestamp,
                    pong_timestamp: self.timestamp(now),
                };
                self.send_control(pong, Reliability::Unreliable, now);
            }
            OnlinePacket::ConnectedPong { .. } => {}
            OnlinePacket::DisconnectionNotification => {
                self.close(DisconnectReason::ClientDisconnect, false, now);
            }
            other => trace!("unexpected {other:?} from {}", self.addr),
        }
    }

    /// Periodic work: staleness check, keep-alive ping, then the session's
    /// resend sweep and ACK flush.
    pub fn tick(&mut self, now: Instant) {
        if self.status >= ConnectionStatus::Disconnecting {
            return;
        }
        if now.saturating_duration_since(self.last_activity) > self.timers.staleness_timeout {
            debug!("{} stale, disconnecting", self.addr);
            self.disconnect(DisconnectReason::TimedOut, now);
            return;
        }

        if self.is_connected()
            && now.saturating_duration_since(self.last_ping_sent) >= self.timers.ping_interval
        {
            let ping = OnlinePacket::ConnectedPing {
                timestamp: self.timestamp(now),
            };
            self.send_control(ping, Reliability::Unreliable, now);
            self.last_ping_sent = now;
            self.ping_probe = self.session.last_sequence().map(|seq| (seq, now));
        }

        self.session.tick(now);
        self.collect_receipts();
    }

    /// Start a disconnect: notify the peer (best effort) and raise the event.
    /// The owner then removes the connection and calls [`Connection::finish`].
    pub fn disconnect(&mut self, reason: DisconnectReason, now: Instant) {
        self.close(reason, true, now);
    }

    fn close(&mut self, reason: DisconnectReason, notify: bool, now: Instant) {
        if self.status >= ConnectionStatus::Disconnecting {
            return;
        }
        self.status = ConnectionStatus::Disconnecting;
        if notify {
            self.send_control(
                OnlinePacket::DisconnectionNotification,
                Reliability::ReliableOrdered,
                now,
            );
        }
        self.session.flush_acks();
        info!("{} disconnected: {reason}", self.addr);
        self.events.push(ConnectionEvent::Disconnected(reason));
    }

    /// Drop all session state. Called once the connection has left the table.
    pub fn finish(&mut self) {
        self.session.clear();
        self.status = ConnectionStatus::Disconnected;
    }

    pub fn drain_outbox(&mut self) -> Vec<Bytes> {
        self.session.drain_outbox()
    }

    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }
}
