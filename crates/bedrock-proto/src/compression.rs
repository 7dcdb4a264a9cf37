//! Batch compression. Zlib here means raw DEFLATE without the zlib header.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::ProtoError;

/// Upper bound on a decompressed batch, guarding against compression bombs.
pub const MAX_DECOMPRESSED_SIZE: usize = 8 * 1024 * 1024;

/// Compression algorithms supported by Bedrock Edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    Zlib,
    Snappy,
    None,
}

impl CompressionAlgorithm {
    /// Parse the u16 carried in NetworkSettings.
    pub fn from_u16(v: u16) -> Result<Self, ProtoError> {
        match v {
            0 => Ok(Self::Zlib),
            1 => Ok(Self::Snappy),
            0xFFFF => Ok(Self::None),
            other => Err(ProtoError::UnknownCompression(other)),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::Zlib => 0,
            Self::Snappy => 1,
            Self::None => 0xFFFF,
        }
    }

    /// Parse the method byte that prefixes a compressed batch.
    pub fn from_byte(v: u8) -> Result<Self, ProtoError> {
        match v {
            0x00 => Ok(Self::Zlib),
            0x01 => Ok(Self::Snappy),
            0xFF => Ok(Self::None),
            other => Err(ProtoError::UnknownCompression(other as u16)),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Zlib => 0x00,
            Self::Snappy => 0x01,
            Self::None => 0xFF,
        }
    }

    /// Parse a config-file name: `zlib`, `snappy` or `none`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "zlib" | "deflate" => Some(Self::Zlib),
            "snappy" => Some(Self::Snappy),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// Compress `data`. `level` is only meaningful for zlib.
pub fn compress(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    level: u32,
) -> Result<Vec<u8>, ProtoError> {
    match algorithm {
        CompressionAlgorithm::Zlib => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level.min(9)));
            encoder
                .write_all(data)
                .map_err(|e| ProtoError::CompressError(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| ProtoError::CompressError(e.to_string()))
        }
        CompressionAlgorithm::Snappy => snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| ProtoError::CompressError(e.to_string())),
        CompressionAlgorithm::None => Ok(data.to_vec()),
    }
}

/// Decompress `data`, refusing output larger than `limit`.
pub fn decompress(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    limit: usize,
) -> Result<Vec<u8>, ProtoError> {
    match algorithm {
        CompressionAlgorithm::Zlib => {
            let mut output = Vec::new();
            DeflateDecoder::new(data)
                .take(limit as u64 + 1)
                .read_to_end(&mut output)
                .map_err(|e| ProtoError::DecompressError(e.to_string()))?;
            if output.len() > limit {
                return Err(ProtoError::DecompressedTooLarge { limit });
            }
            Ok(output)
        }
        CompressionAlgorithm::Snappy => {
            let len = snap::raw::decompress_len(data)
                .map_err(|e| ProtoError::DecompressError(e.to_string()))?;
            if len > limit {
                return Err(ProtoError::DecompressedTooLarge { limit });
            }
            snap::raw::Decoder::new()
                .decompress_vec(data)
                .map_err(|e| ProtoError::DecompressError(e.to_string()))
        }
        CompressionAlgorithm::None => {
            if data.len() > limit {
                return Err(ProtoError::DecompressedTooLarge { limit });
            }
            Ok(data.to_vec())
        }
    }
}
