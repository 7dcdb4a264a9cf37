//! Routes decoded game packets to registered handlers.
//!
//! Handlers for one packet id run in registration order. Any handler or
//! hook returning [`EventResult::Cancelled`] stops propagation for that
//! packet. A handler error is logged and only ends that packet's chain.

use std::collections::HashMap;
use std::net::SocketAddr;

use bedrock_crypto::PacketEncryption;
use bedrock_proto::packets::Disconnect;
use bedrock_proto::GamePacket;
use tracing::{debug, trace, warn};

use crate::error::HandlerError;
use crate::session::{LoginProgress, SessionAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    Continue,
    Cancelled,
}

pub trait PacketHandler: Send {
    fn handle(
        &mut self,
        packet: &GamePacket,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<EventResult, HandlerError>;
}

/// Runs before a packet is encoded for sending.
pub trait SendHook: Send {
    fn on_send(&mut self, addr: SocketAddr, packet: &GamePacket) -> EventResult;
}

/// Runs after a packet is decoded, before any handler sees it.
pub trait ReceiveHook: Send {
    fn on_receive(&mut self, addr: SocketAddr, packet: &GamePacket) -> EventResult;
}

impl<F> SendHook for F
where
    F: FnMut(SocketAddr, &GamePacket) -> EventResult + Send,
{
    fn on_send(&mut self, addr: SocketAddr, packet: &GamePacket) -> EventResult {
        self(addr, packet)
    }
}

/// Closures cannot implement both hook traits, so receive-side closures go
/// through this wrapper.
#[cfg(test)]
pub struct OnReceive<F>(pub F);

#[cfg(test)]
impl<F> ReceiveHook for OnReceive<F>
where
    F: FnMut(SocketAddr, &GamePacket) -> EventResult + Send,
{
    fn on_receive(&mut self, addr: SocketAddr, packet: &GamePacket) -> EventResult {
        (self.0)(addr, packet)
    }
}

/// What a handler may see and do for the connection a packet came from.
/// Effects are queued and applied in order once the handler returns.
pub struct HandlerContext<'a> {
    pub addr: SocketAddr,
    pub login: &'a mut LoginProgress,
    actions: Vec<SessionAction>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(addr: SocketAddr, login: &'a mut LoginProgress) -> Self {
        Self {
            addr,
            login,
            actions: Vec::new(),
        }
    }

    pub fn send(&mut self, packet: impl Into<GamePacket>) {
        self.actions.push(SessionAction::Send(packet.into()));
    }

    /// Compress everything queued after this point.
    pub fn enable_compression(&mut self) {
        self.actions.push(SessionAction::EnableCompression);
    }

    /// Encrypt everything queued after this point.
    pub fn enable_encryption(&mut self, encryption: PacketEncryption) {
        self.actions
            .push(SessionAction::EnableEncryption(Box::new(encryption)));
    }

    /// Close the transport connection once queued packets are out.
    pub fn disconnect(&mut self, reason: impl Into<String>) {
        self.actions.push(SessionAction::Disconnect(reason.into()));
    }

    /// Show the client a disconnect screen, then close.
    pub fn kick(&mut self, message: &str) {
        self.send(Disconnect::with_message(message));
        self.disconnect(message);
    }

    pub fn into_actions(self) -> Vec<SessionAction> {
        self.actions
    }
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u32, Vec<Box<dyn PacketHandler>>>,
    send_hooks: Vec<Box<dyn SendHook>>,
    receive_hooks: Vec<Box<dyn ReceiveHook>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, packet_id: u32, handler: impl PacketHandler + 'static) {
        self.handlers
            .entry(packet_id)
            .or_default()
            .push(Box::new(handler));
    }

    #[cfg(test)]
    pub fn add_send_hook(&mut self, hook: impl SendHook + 'static) {
        self.send_hooks.push(Box::new(hook));
    }

    #[cfg(test)]
    pub fn add_receive_hook(&mut self, hook: impl ReceiveHook + 'static) {
        self.receive_hooks.push(Box::new(hook));
    }

    #[cfg(test)]
    pub fn handler_count(&self, packet_id: u32) -> usize {
        self.handlers.get(&packet_id).map_or(0, Vec::len)
    }

    /// Run the receive hooks, then the handlers registered for the packet.
    pub fn dispatch(&mut self, packet: &GamePacket, ctx: &mut HandlerContext<'_>) -> EventResult {
        for hook in &mut self.receive_hooks {
            if hook.on_receive(ctx.addr, packet) == EventResult::Cancelled {
                trace!("{} from {} cancelled by receive hook", packet.name(), ctx.addr);
                return EventResult::Cancelled;
            }
        }

        let Some(handlers) = self.handlers.get_mut(&packet.id()) else {
            debug!("No handler for {} from {}", packet.name(), ctx.addr);
            return EventResult::Continue;
        };

        for handler in handlers {
            match handler.handle(packet, ctx) {
                Ok(EventResult::Continue) => {}
                Ok(EventResult::Cancelled) => return EventResult::Cancelled,
                Err(e) => {
                    warn!("Handler for {} from {} failed: {e}", packet.name(), ctx.addr);
                    return EventResult::Cancelled;
                }
            }
        }
        EventResult::Continue
    }

    /// Whether the send hooks let `packet` go out.
    pub fn allow_send(&mut self, addr: SocketAddr, packet: &GamePacket) -> bool {
        for hook in &mut self.send_hooks {
            if hook.on_send(addr, packet) == EventResult::Cancelled {
                trace!("{} to {addr} cancelled by send hook", packet.name());
                return false;
            }
        }
        true
    }
}
