use std::time::Duration;

/// The 16-byte offline message magic present in every unconnected packet.
pub const RAKNET_MAGIC: [u8; 16] = [
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56, 0x78,
];

/// RakNet protocol version spoken by Bedrock Edition.
pub const RAKNET_PROTOCOL_VERSION: u8 = 11;

/// IP header (20) + UDP header (8). Added to the OCR1 datagram length to get the MTU.
pub const UDP_HEADER_SIZE: u16 = 28;

/// Default upper MTU bound.
pub const MAX_MTU: u16 = 1492;

/// Default lower MTU bound.
pub const MIN_MTU: u16 = 400;

/// FrameSet header: id byte + 24-bit sequence number.
pub const FRAMESET_HEADER_SIZE: usize = 4;

/// Largest possible frame header (flags, bit length, all indices, split info).
pub const MAX_FRAME_HEADER_SIZE: usize = 1 + 2 + 3 + 3 + 4 + 10;

/// Smallest MTU that still carries one byte of payload in a split frame.
pub const MIN_USABLE_MTU: u16 =
    UDP_HEADER_SIZE + (FRAMESET_HEADER_SIZE + MAX_FRAME_HEADER_SIZE) as u16 + 1;

/// Number of ordering channels.
pub const NUM_ORDER_CHANNELS: usize = 32;

/// Default staleness window: no datagram for this long disconnects the peer.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(15);

/// How often a ConnectedPing is sent to connected peers.
pub const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval of the transport tick.
pub const SERVER_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Default time before an unacknowledged FrameSet is sent again.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum number of fragments allowed per split packet.
pub const MAX_SPLIT_COUNT: u32 = 512;

/// Maximum number of split packets being reassembled at once per peer.
pub const MAX_CONCURRENT_SPLITS: usize = 16;

/// Time after which incomplete fragment assemblies are discarded.
pub const FRAGMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum buffered out-of-order frames per ordering channel.
pub const MAX_ORDER_CHANNEL_BUFFER: usize = 256;

/// Largest gap between received sequence numbers that still gets NACKed.
pub const MAX_NACK_GAP: u32 = 512;

/// Size of the UDP receive buffer.
pub const RECV_BUF_SIZE: usize = 2048;

/// Marker byte that prefixes every game packet batch.
pub const GAME_PACKET_ID: u8 = 0xFE;
