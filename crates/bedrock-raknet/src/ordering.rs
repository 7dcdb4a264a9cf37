use std::collections::BTreeMap;

use bytes::Bytes;

use crate::constants::{MAX_ORDER_CHANNEL_BUFFER, NUM_ORDER_CHANNELS};
use crate::sequence;

/// Inbound ordering and sequencing state for all 32 channels.
pub struct OrderingChannels {
    channels: [OrderChannel; NUM_ORDER_CHANNELS],
}

#[derive(Default)]
struct OrderChannel {
    /// Next order index that may be delivered.
    expected_index: u32,
    /// Out-of-order frames, keyed by order index.
    buffer: BTreeMap<u32, Bytes>,
    /// Newest (order index, sequence index) delivered by a sequenced frame.
    newest_sequenced: Option<(u32, u32)>,
}

impl OrderChannel {
    fn pop_contiguous(&mut self, out: &mut Vec<Bytes>) {
        while let Some(body) = self.buffer.remove(&self.expected_index) {
            out.push(body);
            self.expected_index = sequence::next(self.expected_index);
        }
    }
}

impl OrderingChannels {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| OrderChannel::default()),
        }
    }

    /// Whether a ReliableOrdered frame with `order_index` can be taken now.
    /// Frames that cannot are left unacknowledged so the peer resends them.
    pub fn has_room(&self, channel: u8, order_index: u32) -> bool {
        let ch = &self.channels[channel as usize];
        order_index == ch.expected_index
            || sequence::is_older(order_index, ch.expected_index)
            || ch.buffer.len() < MAX_ORDER_CHANNEL_BUFFER
            || ch.buffer.contains_key(&order_index)
    }

    /// Insert a ReliableOrdered frame. Returns every payload that became
    /// deliverable, in order index order.
    pub fn insert_ordered(&mut self, channel: u8, order_index: u32, body: Bytes) -> Vec<Bytes> {
        let ch = &mut self.channels[channel as usize];

        if order_index == ch.expected_index {
            let mut out = vec![body];
            ch.expected_index = sequence::next(ch.expected_index);
            ch.pop_contiguous(&mut out);
            return out;
        }

        if sequence::is_older(order_index, ch.expected_index) {
            // Already delivered.
            return Vec::new();
        }

        if ch.buffer.len() < MAX_ORDER_CHANNEL_BUFFER {
            ch.buffer.entry(order_index).or_insert(body);
        } else {
            tracing::debug!(channel, order_index, "order buffer full, dropping frame");
        }
        Vec::new()
    }

    /// Insert a sequenced frame. Delivered only when strictly newer than the
    /// newest sequenced frame already delivered on the channel.
    pub fn insert_sequenced(
        &mut self,
        channel: u8,
        order_index: u32,
        sequence_index: u32,
        body: Bytes,
    ) -> Option<Bytes> {
        let ch = &mut self.channels[channel as usize];
        let newer = match ch.newest_sequenced {
            None => true,
            Some((order, seq)) => {
                sequence::is_newer(order_index, order)
                    || (order_index == order && sequence::is_newer(sequence_index, seq))
            }
        };
        if !newer {
            return None;
        }
        ch.newest_sequenced = Some((order_index, sequence_index));
        Some(body)
    }

    /// Frames waiting for a gap to fill on `channel`.
    pub fn buffered(&self, channel: u8) -> usize {
        self.channels[channel as usize].buffer.len()
    }
}

impl Default for OrderingChannels {
    fn default() -> Self {
        Self::new()
    }
}
