//! Minecraft Bedrock Edition game-packet layer: batch framing, compression,
//! variable-length integers and the packets exchanged during login.

pub mod batch;
pub mod codec;
pub mod compression;
pub mod error;
pub mod jwt;
pub mod packets;
pub mod types;

pub use batch::BatchConfig;
pub use compression::CompressionAlgorithm;
pub use error::ProtoError;
pub use packets::{GamePacket, PacketHeader};
