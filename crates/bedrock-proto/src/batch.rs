//! Game packet batches: the payload that follows the 0xFE marker.
//!
//! A batch is a sequence of `VarUInt32 length + packet` records. Once
//! compression is negotiated the whole sequence is compressed and prefixed
//! with a method byte (0xFF when it was left uncompressed).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::compression::{compress, decompress, CompressionAlgorithm, MAX_DECOMPRESSED_SIZE};
use crate::error::ProtoError;
use crate::types::VarUInt32;

/// Per-connection batch codec state.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Algorithm used for outgoing batches.
    pub compression: CompressionAlgorithm,
    /// Zlib level (0-9). Ignored for snappy and none.
    pub compression_level: u32,
    /// Batches smaller than this are sent with method byte 0xFF.
    pub compression_threshold: usize,
    /// False until NetworkSettings has been sent. Never goes back to false.
    pub compression_enabled: bool,
    /// Ceiling on packets in one incoming batch.
    pub max_packets: usize,
    pub max_decompressed_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            compression: CompressionAlgorithm::Zlib,
            compression_level: 7,
            compression_threshold: 256,
            compression_enabled: false,
            max_packets: 500,
            max_decompressed_size: MAX_DECOMPRESSED_SIZE,
        }
    }
}

/// Split a batch (0xFE already stripped and decrypted) into packets.
///
/// Each returned `Bytes` is one packet: header varint followed by its body.
pub fn decode_batch(data: Bytes, config: &BatchConfig) -> Result<Vec<Bytes>, ProtoError> {
    let data = if config.compression_enabled {
        let (&method, body) = data.split_first().ok_or(ProtoError::EmptyBatch)?;
        let algorithm = CompressionAlgorithm::from_byte(method)?;
        Bytes::from(decompress(body, algorithm, config.max_decompressed_size)?)
    } else {
        data
    };

    let mut cursor = data.clone();
    let mut packets = Vec::new();
    while cursor.has_remaining() {
        if packets.len() == config.max_packets {
            return Err(ProtoError::TooManyPackets {
                limit: config.max_packets,
            });
        }
        let len = VarUInt32::proto_decode(&mut cursor)?.0 as usize;
        ProtoError::ensure(&cursor, len)?;
        packets.push(cursor.split_to(len));
    }
    trace!("Decoded batch: {} packets in {} bytes", packets.len(), data.len());
    Ok(packets)
}

/// Build a batch from encoded packets, compressing it when negotiated.
/// The caller prepends 0xFE (and encrypts) before handing it to RakNet.
pub fn encode_batch(packets: &[Bytes], config: &BatchConfig) -> Result<Bytes, ProtoError> {
    let mut batch = BytesMut::new();
    for packet in packets {
        VarUInt32(packet.len() as u32).proto_encode(&mut batch);
        batch.put_slice(packet);
    }

    if !config.compression_enabled {
        return Ok(batch.freeze());
    }

    let algorithm = if batch.len() < config.compression_threshold {
        CompressionAlgorithm::None
    } else {
        config.compression
    };
    let compressed = compress(&batch, algorithm, config.compression_level)?;
    trace!(
        "Encoded batch: {} packets, {} -> {} bytes ({algorithm:?})",
        packets.len(),
        batch.len(),
        compressed.len()
    );

    let mut output = BytesMut::with_capacity(1 + compressed.len());
    output.put_u8(algorithm.to_byte());
    output.put_slice(&compressed);
    Ok(output.freeze())
}
