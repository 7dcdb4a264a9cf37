use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{ensure, read_u24_le, write_u24_le};
use crate::constants::{FRAMESET_HEADER_SIZE, NUM_ORDER_CHANNELS};
use crate::error::RakNetError;
use crate::reliability::Reliability;

/// Header id written on outgoing FrameSets (valid bit + continuous-send flag).
pub const FRAMESET_ID: u8 = 0x84;

const SPLIT_FLAG: u8 = 0x10;

/// Split/fragment metadata for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitInfo {
    pub count: u32,
    pub id: u16,
    pub index: u32,
}

/// A single reliability-tagged payload within a FrameSet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub reliability: Reliability,
    pub reliable_index: Option<u32>,
    pub sequence_index: Option<u32>,
    pub order_index: Option<u32>,
    pub order_channel: Option<u8>,
    pub split: Option<SplitInfo>,
    pub body: Bytes,
}

impl Frame {
    /// An unsplit frame with no indices assigned yet.
    pub fn new(reliability: Reliability, body: Bytes) -> Self {
        Self {
            reliability,
            reliable_index: None,
            sequence_index: None,
            order_index: None,
            order_channel: None,
            split: None,
            body,
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, RakNetError> {
        ensure(buf, 3)?;
        let flags = buf.get_u8();
        let reliability = Reliability::from_u8(flags >> 5)?;
        let is_split = flags & SPLIT_FLAG != 0;

        let body_length = (buf.get_u16() as usize).div_ceil(8);

        let reliable_index = if reliability.is_reliable() {
            Some(read_u24_le(buf)?)
        } else {
            None
        };

        let sequence_index = if reliability.is_sequenced() {
            Some(read_u24_le(buf)?)
        } else {
            None
        };

        let (order_index, order_channel) = if reliability.is_ordered_or_sequenced() {
            let index = read_u24_le(buf)?;
            ensure(buf, 1)?;
            let channel = buf.get_u8();
            if channel as usize >= NUM_ORDER_CHANNELS {
                return Err(RakNetError::InvalidOrderChannel(channel));
            }
            (Some(index), Some(channel))
        } else {
            (None, None)
        };

        let split = if is_split {
            ensure(buf, 10)?;
            Some(SplitInfo {
                count: buf.get_u32(),
                id: buf.get_u16(),
                index: buf.get_u32(),
            })
        } else {
            None
        };

        ensure(buf, body_length)?;
        let body = buf.copy_to_bytes(body_length);

        Ok(Self {
            reliability,
            reliable_index,
            sequence_index,
            order_index,
            order_channel,
            split,
            body,
        })
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        let mut flags = (self.reliability as u8) << 5;
        if self.split.is_some() {
            flags |= SPLIT_FLAG;
        }
        buf.put_u8(flags);
        buf.put_u16((self.body.len() * 8) as u16);

        if self.reliability.is_reliable() {
            write_u24_le(buf, self.reliable_index.unwrap_or(0));
        }
        if self.reliability.is_sequenced() {
            write_u24_le(buf, self.sequence_index.unwrap_or(0));
        }
        if self.reliability.is_ordered_or_sequenced() {
            write_u24_le(buf, self.order_index.unwrap_or(0));
            buf.put_u8(self.order_channel.unwrap_or(0));
        }
        if let Some(split) = &self.split {
            buf.put_u32(split.count);
            buf.put_u16(split.id);
            buf.put_u32(split.index);
        }
        buf.put_slice(&self.body);
    }

    /// Header bytes this frame needs on the wire for its reliability class.
    pub fn header_size(reliability: Reliability, split: bool) -> usize {
        let mut size = 1 + 2;
        if reliability.is_reliable() {
            size += 3;
        }
        if reliability.is_sequenced() {
            size += 3;
        }
        if reliability.is_ordered_or_sequenced() {
            size += 4;
        }
        if split {
            size += 10;
        }
        size
    }

    pub fn encoded_size(&self) -> usize {
        Self::header_size(self.reliability, self.split.is_some()) + self.body.len()
    }
}

/// A sequence-numbered batch of frames sent as one datagram.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub sequence_number: u32,
    pub frames: Vec<Frame>,
}

impl FrameSet {
    /// Decode a FrameSet. A datagram carrying no frames is malformed.
    pub fn decode(data: &[u8]) -> Result<Self, RakNetError> {
        if data.len() < FRAMESET_HEADER_SIZE {
            return Err(RakNetError::short(FRAMESET_HEADER_SIZE, data.len()));
        }
        let mut buf = std::io::Cursor::new(data);
        let _flags = buf.get_u8();
        let sequence_number = read_u24_le(&mut buf)?;

        let mut frames = Vec::new();
        while buf.has_remaining() {
            frames.push(Frame::decode(&mut buf)?);
        }
        if frames.is_empty() {
            return Err(RakNetError::short(FRAMESET_HEADER_SIZE + 3, data.len()));
        }

        Ok(Self {
            sequence_number,
            frames,
        })
    }

    /// Write the id byte and sequence number that open every FrameSet.
    pub fn write_header(buf: &mut impl BufMut, sequence_number: u32) {
        buf.put_u8(FRAMESET_ID);
        write_u24_le(buf, sequence_number);
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        Self::write_header(buf, self.sequence_number);
        for frame in &self.frames {
            frame.encode(buf);
        }
    }

    pub fn encoded_size(&self) -> usize {
        FRAMESET_HEADER_SIZE + self.frames.iter().map(Frame::encoded_size).sum::<usize>()
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(frame: &Frame) -> Frame {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        assert_eq!(buf.len(), frame.encoded_size());
        Frame::decode(&mut std::io::Cursor::new(&buf[..])).unwrap()
    }

    #[test]
    fn header_flags_layout() {
        let mut frame = Frame::new(Reliability::ReliableOrdered, Bytes::from_static(b"ab"));
        frame.reliable_index = Some(1);
        frame.order_index = Some(2);
        frame.order_channel = Some(0);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        assert_eq!(buf[0], 3 << 5);
        // bit length, big-endian
        assert_eq!(&buf[1..3], &[0x00, 16]);
    }

    #[test]
    fn reliable_sequenced_carries_every_index() {
        let frame = Frame {
            reliability: Reliability::ReliableSequenced,
            reliable_index: Some(9),
            sequence_index: Some(4),
            order_index: Some(2),
            order_channel: Some(3),
            split: None,
            body: Bytes::from_static(b"pos"),
        };
        assert_eq!(decode_one(&frame), frame);
    }

    #[test]
    fn split_frame_carries_split_info() {
        let frame = Frame {
            reliability: Reliability::Reliable,
            reliable_index: Some(100),
            sequence_index: None,
            order_index: None,
            order_channel: None,
            split: Some(SplitInfo {
                count: 3,
                id: 7,
                index: 2,
            }),
            body: Bytes::from_static(b"fragment"),
        };
        let decoded = decode_one(&frame);
        assert_eq!(decoded.split, frame.split);
    }

    #[test]
    fn truncated_body_is_malformed() {
        let frame = Frame::new(Reliability::Unreliable, Bytes::from_static(b"hello"));
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        buf.truncate(buf.len() - 2);
        assert!(matches!(
            Frame::decode(&mut std::io::Cursor::new(&buf[..])),
            Err(RakNetError::PacketTooShort { .. })
        ));
    }

    #[test]
    fn out_of_range_channel_rejected() {
        let mut frame = Frame::new(Reliability::ReliableOrdered, Bytes::from_static(b"x"));
        frame.reliable_index = Some(0);
        frame.order_index = Some(0);
        frame.order_channel = Some(40);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        assert!(matches!(
            Frame::decode(&mut std::io::Cursor::new(&buf[..])),
            Err(RakNetError::InvalidOrderChannel(40))
        ));
    }

    #[test]
    fn frameset_with_two_frames() {
        let fs = FrameSet {
            sequence_number: 0x012345,
            frames: vec![
                Frame::new(Reliability::Unreliable, Bytes::from_static(b"one")),
                Frame::new(Reliability::UnreliableAck, Bytes::from_static(b"two")),
            ],
        };
        let bytes = fs.to_bytes();
        assert_eq!(bytes[0], FRAMESET_ID);
        assert_eq!(bytes.len(), fs.encoded_size());
        let decoded = FrameSet::decode(&bytes).unwrap();
        assert_eq!(decoded.sequence_number, 0x012345);
        assert_eq!(decoded.frames, fs.frames);
    }

    #[test]
    fn empty_frameset_is_malformed() {
        let data = [FRAMESET_ID, 1, 0, 0];
        assert!(FrameSet::decode(&data).is_err());
    }
}
