use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{info, trace, warn};

use crate::connection::DisconnectReason;
use crate::constants::RECV_BUF_SIZE;
use crate::error::RakNetError;
use crate::packet::offline::ServerMotd;
use crate::reliability::{Priority, Reliability};
use crate::transport::{RakNetConfig, RakNetEvent, Transport};

/// Commands that other tasks send to the server loop.
#[derive(Debug)]
pub enum ServerCommand {
    Send {
        addr: SocketAddr,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        priority: Priority,
    },
    Disconnect {
        addr: SocketAddr,
        reason: String,
    },
    SetMotd(ServerMotd),
}

/// A cloneable handle for talking to the server loop from any task.
#[derive(Clone)]
pub struct ServerHandle {
    command_tx: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    /// Queue a payload for a connected peer.
    pub async fn send_to(
        &self,
        addr: SocketAddr,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        priority: Priority,
    ) {
        self.command(ServerCommand::Send {
            addr,
            payload,
            reliability,
            channel,
            priority,
        })
        .await;
    }

    pub async fn disconnect(&self, addr: SocketAddr, reason: impl Into<String>) {
        self.command(ServerCommand::Disconnect {
            addr,
            reason: reason.into(),
        })
        .await;
    }

    /// Replace the advertisement returned to unconnected pings.
    pub async fn set_motd(&self, motd: ServerMotd) {
        self.command(ServerCommand::SetMotd(motd)).await;
    }

    async fn command(&self, cmd: ServerCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            trace!("server loop gone, dropping command");
        }
    }
}

/// Owns the UDP socket and drives a [`Transport`] from it.
pub struct RakNetServer {
    socket: UdpSocket,
    transport: Transport,
    config: RakNetConfig,
    event_tx: mpsc::Sender<RakNetEvent>,
    command_rx: mpsc::Receiver<ServerCommand>,
}

impl RakNetServer {
    /// Bind the UDP socket. Returns the server, the event stream for the
    /// consumer and a handle for sending commands.
    pub async fn bind(
        config: RakNetConfig,
    ) -> Result<(Self, mpsc::Receiver<RakNetEvent>, ServerHandle), RakNetError> {
        config.validate()?;
        let socket = UdpSocket::bind(config.address).await?;
        let local = socket.local_addr()?;
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(1024);

        info!("RakNet server bound on {local}");

        Ok((
            Self {
                transport: Transport::new(&config, local.port()),
                socket,
                config,
                event_tx,
                command_rx,
            },
            event_rx,
            ServerHandle { command_tx },
        ))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RakNetError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run until the shutdown signal flips to `true`, then notify every peer
    /// and return. The socket is closed when the server is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut recv_buf = vec![0u8; RECV_BUF_SIZE];
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut recv_buf) => match result {
                    Ok((len, addr)) => {
                        self.transport.handle_datagram(&recv_buf[..len], addr, Instant::now());
                    }
                    Err(e) => warn!("UDP recv error: {e}"),
                },
                Some(cmd) = self.command_rx.recv() => self.handle_command(cmd),
                _ = tick.tick() => self.transport.tick(Instant::now()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("RakNet server shutting down");
                        self.transport.shutdown(Instant::now());
                        self.flush().await;
                        break;
                    }
                }
            }
            self.flush().await;
        }
    }

    fn handle_command(&mut self, cmd: ServerCommand) {
        let now = Instant::now();
        match cmd {
            ServerCommand::Send {
                addr,
                payload,
                reliability,
                channel,
                priority,
            } => {
                self.transport
                    .send(addr, payload, reliability, channel, priority, now);
            }
            ServerCommand::Disconnect { addr, reason } => {
                self.transport
                    .disconnect(addr, DisconnectReason::Kicked(reason), now);
            }
            ServerCommand::SetMotd(motd) => self.transport.set_motd(motd),
        }
    }

    /// Write pending datagrams and forward pending events.
    async fn flush(&mut self) {
        for (addr, datagram) in self.transport.drain_outbox() {
            if let Err(e) = self.socket.send_to(&datagram, addr).await {
                trace!("send to {addr} failed: {e}");
            }
        }
        while let Some(event) = self.transport.poll_event() {
            if self.event_tx.send(event).await.is_err() {
                trace!("event receiver dropped");
                break;
            }
        }
    }
}
