//! RakNet-style reliable UDP transport for Minecraft Bedrock Edition.
//!
//! [`Transport`] is the socket-free state machine; [`RakNetServer`] drives it
//! from a tokio `UdpSocket`.

pub mod address;
pub mod codec;
pub mod connection;
pub mod constants;
pub mod error;
pub mod fragmentation;
pub mod handshake;
pub mod ordering;
pub mod packet;
pub mod reliability;
pub mod sequence;
pub mod server;
pub mod session;
pub mod transport;

pub use address::WireAddress;
pub use connection::{Connection, ConnectionStatus, DisconnectReason};
pub use error::RakNetError;
pub use packet::offline::ServerMotd;
pub use reliability::{Priority, Reliability};
pub use server::{RakNetServer, ServerCommand, ServerHandle};
pub use session::DeliveryReceipt;
pub use transport::{RakNetConfig, RakNetEvent, Transport};
