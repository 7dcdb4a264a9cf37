use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{ensure, read_u24_le, write_u24_le};
use crate::error::RakNetError;
use crate::sequence;

/// Upper bound on sequence numbers expanded from a single ACK/NACK.
const MAX_EXPANDED: usize = 8192;

/// A single ACK/NACK record: one sequence number or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckRecord {
    Single(u32),
    Range { min: u32, max: u32 },
}

/// An ACK or NACK datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckNack {
    pub is_ack: bool,
    pub records: Vec<AckRecord>,
}

impl AckNack {
    pub const ACK_ID: u8 = 0xC0;
    pub const NACK_ID: u8 = 0xA0;

    pub fn ack(sequences: &mut Vec<u32>) -> Self {
        Self {
            is_ack: true,
            records: compress_records(sequences),
        }
    }

    pub fn nack(sequences: &mut Vec<u32>) -> Self {
        Self {
            is_ack: false,
            records: compress_records(sequences),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, RakNetError> {
        let mut buf = std::io::Cursor::new(data);
        ensure(&buf, 3)?;
        let is_ack = buf.get_u8() == Self::ACK_ID;
        let record_count = buf.get_u16() as usize;

        let mut records = Vec::with_capacity(record_count.min(64));
        for _ in 0..record_count {
            ensure(&buf, 1)?;
            // 1 = single, 0 = range
            let single = buf.get_u8() != 0;
            if single {
                records.push(AckRecord::Single(read_u24_le(&mut buf)?));
            } else {
                let min = read_u24_le(&mut buf)?;
                let max = read_u24_le(&mut buf)?;
                records.push(AckRecord::Range { min, max });
            }
        }

        Ok(Self { is_ack, records })
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(if self.is_ack {
            Self::ACK_ID
        } else {
            Self::NACK_ID
        });
        buf.put_u16(self.records.len() as u16);
        for record in &self.records {
            match *record {
                AckRecord::Single(seq) => {
                    buf.put_u8(1);
                    write_u24_le(buf, seq);
                }
                AckRecord::Range { min, max } => {
                    buf.put_u8(0);
                    write_u24_le(buf, min);
                    write_u24_le(buf, max);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> bytes::Bytes {
        let mut buf = BytesMut::with_capacity(3 + self.records.len() * 7);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// All sequence numbers named by this datagram, capped against hostile ranges.
    pub fn sequences(&self) -> Vec<u32> {
        expand_records(&self.records)
    }
}

/// Compress a list of sequence numbers into contiguous records.
/// The list is sorted and deduplicated in place.
pub fn compress_records(seq_nums: &mut Vec<u32>) -> Vec<AckRecord> {
    if seq_nums.is_empty() {
        return Vec::new();
    }
    seq_nums.sort_unstable();
    seq_nums.dedup();

    let mut records = Vec::new();
    let mut start = seq_nums[0];
    let mut end = start;

    let mut push = |start: u32, end: u32| {
        if start == end {
            records.push(AckRecord::Single(start));
        } else {
            records.push(AckRecord::Range {
                min: start,
                max: end,
            });
        }
    };

    for &seq in &seq_nums[1..] {
        if seq == sequence::next(end) {
            end = seq;
        } else {
            push(start, end);
            start = seq;
            end = seq;
        }
    }
    push(start, end);

    records
}

/// Expand records into individual sequence numbers. Ranges that wrap the
/// u24 space are walked modularly.
pub fn expand_records(records: &[AckRecord]) -> Vec<u32> {
    let mut result = Vec::new();
    for record in records {
        match *record {
            AckRecord::Single(seq) => result.push(seq),
            AckRecord::Range { min, max } => {
                let mut seq = min;
                loop {
                    if result.len() >= MAX_EXPANDED {
                        return result;
                    }
                    result.push(seq);
                    if seq == max {
                        break;
                    }
                    seq = sequence::next(seq);
                }
            }
        }
        if result.len() >= MAX_EXPANDED {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_mixed() {
        let mut seqs = vec![9, 1, 2, 3, 5, 7, 8, 2];
        let records = compress_records(&mut seqs);
        assert_eq!(
            records,
            vec![
                AckRecord::Range { min: 1, max: 3 },
                AckRecord::Single(5),
                AckRecord::Range { min: 7, max: 9 },
            ]
        );
        assert_eq!(expand_records(&records), vec![1, 2, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn compress_empty() {
        assert!(compress_records(&mut Vec::new()).is_empty());
    }

    #[test]
    fn wire_layout_single_and_range() {
        let ack = AckNack {
            is_ack: true,
            records: vec![AckRecord::Single(5), AckRecord::Range { min: 10, max: 12 }],
        };
        let bytes = ack.to_bytes();
        assert_eq!(
            &bytes[..],
            &[0xC0, 0x00, 0x02, 1, 5, 0, 0, 0, 10, 0, 0, 12, 0, 0]
        );
        assert_eq!(AckNack::decode(&bytes).unwrap(), ack);
    }

    #[test]
    fn nack_id() {
        let nack = AckNack::nack(&mut vec![0, 1, 2, 3]);
        let bytes = nack.to_bytes();
        assert_eq!(bytes[0], AckNack::NACK_ID);
        let decoded = AckNack::decode(&bytes).unwrap();
        assert!(!decoded.is_ack);
        assert_eq!(decoded.sequences(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn range_across_wrap() {
        let records = [AckRecord::Range {
            min: 0xFF_FFFE,
            max: 1,
        }];
        assert_eq!(expand_records(&records), vec![0xFF_FFFE, 0xFF_FFFF, 0, 1]);
    }

    #[test]
    fn hostile_range_is_capped() {
        let records = [AckRecord::Range {
            min: 0,
            max: 0xFF_FFFF,
        }];
        assert_eq!(expand_records(&records).len(), MAX_EXPANDED);
    }

    #[test]
    fn truncated_record_rejected() {
        let data = [0xC0, 0x00, 0x02, 1, 5, 0, 0];
        assert!(AckNack::decode(&data).is_err());
    }
}
