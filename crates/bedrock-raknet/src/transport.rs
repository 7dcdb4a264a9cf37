use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::connection::{
    Connection, ConnectionEvent, ConnectionStatus, ConnectionTimers, DisconnectReason,
};
use crate::constants::*;
use crate::error::RakNetError;
use crate::handshake::Handshake;
use crate::packet::offline::ServerMotd;
use crate::packet::DatagramKind;
use crate::reliability::{Priority, Reliability};
use crate::session::DeliveryReceipt;

/// Transport settings, supplied as plain values at construction.
#[derive(Debug, Clone)]
pub struct RakNetConfig {
    pub address: SocketAddr,
    pub server_guid: i64,
    pub motd: ServerMotd,
    pub max_connections: usize,
    pub min_mtu: u16,
    pub max_mtu: u16,
    pub resend_timeout: Duration,
    pub staleness_timeout: Duration,
    pub ping_interval: Duration,
    pub tick_interval: Duration,
}

impl RakNetConfig {
    /// A config with the default limits and timers.
    pub fn new(address: SocketAddr, server_guid: i64, motd: ServerMotd) -> Self {
        Self {
            address,
            server_guid,
            motd,
            max_connections: 20,
            min_mtu: MIN_MTU,
            max_mtu: MAX_MTU,
            resend_timeout: RETRANSMIT_TIMEOUT,
            staleness_timeout: SESSION_TIMEOUT,
            ping_interval: PING_INTERVAL,
            tick_interval: SERVER_TICK_INTERVAL,
        }
    }

    /// Reject MTU bounds that leave no room for a frame.
    pub fn validate(&self) -> Result<(), RakNetError> {
        if self.min_mtu < MIN_USABLE_MTU {
            return Err(RakNetError::MtuOutOfRange(self.min_mtu));
        }
        if self.max_mtu < self.min_mtu {
            return Err(RakNetError::MtuOutOfRange(self.max_mtu));
        }
        Ok(())
    }

    fn timers(&self) -> ConnectionTimers {
        ConnectionTimers {
            resend_timeout: self.resend_timeout,
            staleness_timeout: self.staleness_timeout,
            ping_interval: self.ping_interval,
        }
    }
}

/// Events raised by the transport for its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RakNetEvent {
    /// A connection completed the online handshake.
    Connected { addr: SocketAddr, guid: i64 },
    Disconnected {
        addr: SocketAddr,
        reason: DisconnectReason,
    },
    /// A reassembled, ordered game payload (starts with 0xFE).
    Packet { addr: SocketAddr, payload: Bytes },
    Receipt {
        addr: SocketAddr,
        receipt: DeliveryReceipt,
    },
}

/// The transport state machine: connection table, handshake and routing.
/// It never touches a socket; datagrams go in through
/// [`Transport::handle_datagram`] and come out of [`Transport::drain_outbox`].
pub struct Transport {
    handshake: Handshake,
    timers: ConnectionTimers,
    connections: HashMap<SocketAddr, Connection>,
    outbox: Vec<(SocketAddr, Bytes)>,
    events: VecDeque<RakNetEvent>,
}

impl Transport {
    /// `bound_port` is the port the socket actually bound, which OCR2 must name.
    pub fn new(config: &RakNetConfig, bound_port: u16) -> Self {
        Self {
            handshake: Handshake::new(
                config.server_guid,
                bound_port,
                config.min_mtu,
                config.max_mtu,
                config.max_connections,
                config.motd.clone(),
            ),
            timers: config.timers(),
            connections: HashMap::new(),
            outbox: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Route one datagram by its header's valid bit.
    pub fn handle_datagram(&mut self, data: &[u8], from: SocketAddr, now: Instant) {
        let Some(&header) = data.first() else {
            return;
        };

        if DatagramKind::classify(header) != DatagramKind::Offline {
            match self.connections.get_mut(&from) {
                Some(conn) => {
                    conn.handle_datagram(data, now);
                    self.collect(from);
                }
                None => trace!("connected datagram from unknown peer {from}"),
            }
            return;
        }

        let outcome = match self.handshake.respond(data, from, &self.connections) {
            Ok(outcome) => outcome,
            Err(e) => {
                trace!("dropping offline datagram from {from}: {e}");
                return;
            }
        };
        if let Some(reply) = outcome.reply {
            self.outbox.push((from, reply));
        }
        if let Some(open) = outcome.open {
            debug!("new connection {from} (guid {}, MTU {})", open.guid, open.mtu);
            self.connections.insert(
                from,
                Connection::new(from, open.guid, open.mtu, self.timers, now),
            );
        }
    }

    /// Queue a payload for a connection. Returns the receipt id for
    /// [`Reliability::UnreliableAck`] payloads.
    pub fn send(
        &mut self,
        addr: SocketAddr,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        priority: Priority,
        now: Instant,
    ) -> Option<u32> {
        let conn = self.connections.get_mut(&addr)?;
        let receipt = conn.send(payload, reliability, channel, priority, now);
        self.collect(addr);
        receipt
    }

    pub fn disconnect(&mut self, addr: SocketAddr, reason: DisconnectReason, now: Instant) {
        if let Some(conn) = self.connections.get_mut(&addr) {
            conn.disconnect(reason, now);
            self.collect(addr);
        }
    }

    /// Tick every connection. Iterates over a snapshot of the table so that
    /// connections removed during the tick are simply skipped.
    pub fn tick(&mut self, now: Instant) {
        let addrs: Vec<SocketAddr> = self.connections.keys().copied().collect();
        for addr in addrs {
            if let Some(conn) = self.connections.get_mut(&addr) {
                conn.tick(now);
                self.collect(addr);
            }
        }
    }

    /// Notify and drop every connection.
    pub fn shutdown(&mut self, now: Instant) {
        let addrs: Vec<SocketAddr> = self.connections.keys().copied().collect();
        for addr in addrs {
            self.disconnect(addr, DisconnectReason::ServerShutdown, now);
        }
    }

    /// Move a connection's datagrams and events out, and remove it from the
    /// table once it started disconnecting.
    fn collect(&mut self, addr: SocketAddr) {
        let Some(conn) = self.connections.get_mut(&addr) else {
            return;
        };
        self.outbox
            .extend(conn.drain_outbox().into_iter().map(|d| (addr, d)));

        let guid = conn.guid();
        for event in conn.drain_events() {
            self.events.push_back(match event {
                ConnectionEvent::Connected => RakNetEvent::Connected { addr, guid },
                ConnectionEvent::Packet(payload) => RakNetEvent::Packet { addr, payload },
                ConnectionEvent::Receipt(receipt) => RakNetEvent::Receipt { addr, receipt },
                ConnectionEvent::Disconnected(reason) => {
                    RakNetEvent::Disconnected { addr, reason }
                }
            });
        }

        if conn.status() >= ConnectionStatus::Disconnecting {
            if let Some(mut conn) = self.connections.remove(&addr) {
                conn.finish();
            }
        }
    }

    pub fn set_motd(&mut self, motd: ServerMotd) {
        self.handshake.set_motd(motd);
    }

    pub fn motd(&self) -> &ServerMotd {
        self.handshake.motd()
    }

    pub fn connection(&self, addr: &SocketAddr) -> Option<&Connection> {
        self.connections.get(addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Datagrams to write, with their destination.
    pub fn drain_outbox(&mut self) -> Vec<(SocketAddr, Bytes)> {
        std::mem::take(&mut self.outbox)
    }

    pub fn poll_event(&mut self) -> Option<RakNetEvent> {
        self.events.pop_front()
    }
}
