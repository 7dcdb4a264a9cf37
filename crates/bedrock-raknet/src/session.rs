use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::constants::*;
use crate::fragmentation::SplitAssembler;
use crate::ordering::OrderingChannels;
use crate::packet::ack::AckNack;
use crate::packet::frame::{Frame, FrameSet, SplitInfo};
use crate::reliability::{Priority, Reliability};
use crate::sequence;

/// Reliable indices accepted ahead of the oldest missing one.
const RELIABLE_WINDOW: usize = 65_536;

/// Largest number of ACK/NACK records written in one datagram.
const MAX_RECORDS_PER_DATAGRAM: usize = 128;

/// Outcome of a frame sent with [`Reliability::UnreliableAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub id: u32,
    /// False when the carrying datagram was reported lost.
    pub delivered: bool,
}

struct Outgoing {
    frame: Frame,
    receipt: Option<u32>,
}

/// A sent FrameSet kept until the peer acknowledges it.
struct InFlight {
    frames: Vec<Outgoing>,
    sent_at: Instant,
}

/// Duplicate filter over reliable indices: everything before `base` has been
/// seen, plus the explicit set of indices above it.
#[derive(Default)]
struct ReliableWindow {
    base: u32,
    above: HashSet<u32>,
}

impl ReliableWindow {
    fn contains(&self, index: u32) -> bool {
        sequence::is_older(index, self.base) || self.above.contains(&index)
    }

    fn has_room(&self, index: u32) -> bool {
        index == self.base || self.above.len() < RELIABLE_WINDOW
    }

    /// Returns false if `index` was already seen.
    fn insert(&mut self, index: u32) -> bool {
        if sequence::is_older(index, self.base) {
            return false;
        }
        if index == self.base {
            self.base = sequence::next(self.base);
            while self.above.remove(&self.base) {
                self.base = sequence::next(self.base);
            }
            return true;
        }
        if self.above.len() >= RELIABLE_WINDOW {
            return false;
        }
        self.above.insert(index)
    }
}

/// Per-peer reliability state: framing, acknowledgement, resend, ordering and
/// reassembly. Time is always passed in, so the whole session is driven by
/// its owner.
pub struct ReliabilitySession {
    mtu: u16,
    resend_timeout: Duration,

    // Send side.
    next_sequence: u32,
    last_sequence: Option<u32>,
    next_reliable_index: u32,
    order_index: [u32; NUM_ORDER_CHANNELS],
    sequence_index: [u32; NUM_ORDER_CHANNELS],
    next_split_id: u16,
    next_receipt: u32,
    send_queue: VecDeque<Outgoing>,
    in_flight: HashMap<u32, InFlight>,
    pending_receipts: HashMap<u32, u32>,
    receipts: Vec<DeliveryReceipt>,
    outbox: Vec<Bytes>,

    // Receive side.
    highest_received: Option<u32>,
    ack_queue: Vec<u32>,
    nack_queue: Vec<u32>,
    reliable_window: ReliableWindow,
    ordering: OrderingChannels,
    splits: SplitAssembler,
}

impl ReliabilitySession {
    pub fn new(mtu: u16, resend_timeout: Duration) -> Self {
        Self {
            mtu,
            resend_timeout,
            next_sequence: 0,
            last_sequence: None,
            next_reliable_index: 0,
            order_index: [0; NUM_ORDER_CHANNELS],
            sequence_index: [0; NUM_ORDER_CHANNELS],
            next_split_id: 0,
            next_receipt: 0,
            send_queue: VecDeque::new(),
            in_flight: HashMap::new(),
            pending_receipts: HashMap::new(),
            receipts: Vec::new(),
            outbox: Vec::new(),
            highest_received: None,
            ack_queue: Vec::new(),
            nack_queue: Vec::new(),
            reliable_window: ReliableWindow::default(),
            ordering: OrderingChannels::new(),
            splits: SplitAssembler::new(),
        }
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Bytes available for one FrameSet datagram.
    fn datagram_capacity(&self) -> usize {
        self.mtu.saturating_sub(UDP_HEADER_SIZE) as usize
    }

    /// Queue `body` for the peer. Returns a receipt id for
    /// [`Reliability::UnreliableAck`] payloads.
    ///
    /// A payload that would need more than [`MAX_SPLIT_COUNT`] fragments
    /// at this MTU is dropped with a warning, since no peer reassembles it.
    pub fn send(
        &mut self,
        body: Bytes,
        reliability: Reliability,
        channel: u8,
        priority: Priority,
        now: Instant,
    ) -> Option<u32> {
        let channel = channel.min(NUM_ORDER_CHANNELS as u8 - 1);
        let capacity = self
            .datagram_capacity()
            .saturating_sub(FRAMESET_HEADER_SIZE);

        let split = if Frame::header_size(reliability, false) + body.len() <= capacity {
            None
        } else {
            // Fragments must all arrive, so unreliable classes are upgraded.
            let reliability = match reliability {
                Reliability::UnreliableSequenced => Reliability::ReliableSequenced,
                r if r.is_reliable() => r,
                _ => Reliability::Reliable,
            };
            let chunk = capacity.saturating_sub(Frame::header_size(reliability, true));
            if chunk == 0 {
                tracing::warn!(mtu = self.mtu, "MTU leaves no room for payload, dropping it");
                return None;
            }
            let count = body.len().div_ceil(chunk);
            if count > MAX_SPLIT_COUNT as usize {
                tracing::warn!(
                    len = body.len(),
                    count,
                    "payload needs more than {MAX_SPLIT_COUNT} fragments, dropping it"
                );
                return None;
            }
            Some((reliability, chunk, count as u32))
        };

        let receipt = reliability.wants_receipt().then(|| {
            let id = self.next_receipt;
            self.next_receipt = self.next_receipt.wrapping_add(1);
            id
        });
        let (order_index, sequence_index) = self.assign_order(reliability, channel);

        if let Some((reliability, chunk, count)) = split {
            let id = self.next_split_id;
            self.next_split_id = self.next_split_id.wrapping_add(1);

            if let Some(r) = receipt {
                self.pending_receipts.insert(r, count);
            }
            for index in 0..count {
                let start = index as usize * chunk;
                let end = (start + chunk).min(body.len());
                let mut frame = Frame::new(reliability, body.slice(start..end));
                frame.split = Some(SplitInfo { count, id, index });
                self.stamp(&mut frame, order_index, sequence_index, channel);
                self.send_queue.push_back(Outgoing { frame, receipt });
            }
        } else {
            let mut frame = Frame::new(reliability, body);
            self.stamp(&mut frame, order_index, sequence_index, channel);
            self.send_queue.push_back(Outgoing { frame, receipt });
        }
        if let Some(r) = receipt {
            self.pending_receipts.entry(r).or_insert(1);
        }

        if priority == Priority::Immediate {
            self.flush(now);
        }
        receipt
    }

    fn assign_order(&mut self, reliability: Reliability, channel: u8) -> (u32, u32) {
        let ch = channel as usize;
        if reliability.is_ordered() {
            let index = self.order_index[ch];
            self.order_index[ch] = sequence::next(index);
            self.sequence_index[ch] = 0;
            (index, 0)
        } else if reliability.is_sequenced() {
            // Sequenced frames ride on the current order index without consuming it.
            let index = self.sequence_index[ch];
            self.sequence_index[ch] = sequence::next(index);
            (self.order_index[ch], index)
        } else {
            (0, 0)
        }
    }

    fn stamp(&mut self, frame: &mut Frame, order_index: u32, sequence_index: u32, channel: u8) {
        let reliability = frame.reliability;
        if reliability.is_reliable() {
            frame.reliable_index = Some(self.next_reliable_index);
            self.next_reliable_index = sequence::next(self.next_reliable_index);
        }
        if reliability.is_sequenced() {
            frame.sequence_index = Some(sequence_index);
        }
        if reliability.is_ordered_or_sequenced() {
            frame.order_index = Some(order_index);
            frame.order_channel = Some(channel);
        }
    }

    /// Pack every queued frame into FrameSets and move them to the outbox.
    pub fn flush(&mut self, now: Instant) {
        let queued: Vec<Outgoing> = self.send_queue.drain(..).collect();
        self.transmit(queued, now);
    }

    fn transmit(&mut self, frames: Vec<Outgoing>, now: Instant) {
        let capacity = self.datagram_capacity();
        let mut pending: Vec<Outgoing> = Vec::new();
        let mut size = FRAMESET_HEADER_SIZE;

        for out in frames {
            let frame_size = out.frame.encoded_size();
            if !pending.is_empty() && size + frame_size > capacity {
                self.emit(std::mem::take(&mut pending), now);
                size = FRAMESET_HEADER_SIZE;
            }
            size += frame_size;
            pending.push(out);
        }
        if !pending.is_empty() {
            self.emit(pending, now);
        }
    }

    fn emit(&mut self, frames: Vec<Outgoing>, now: Instant) {
        let sequence_number = self.next_sequence;
        self.next_sequence = sequence::next(sequence_number);
        self.last_sequence = Some(sequence_number);

        let mut buf = BytesMut::with_capacity(self.datagram_capacity());
        FrameSet::write_header(&mut buf, sequence_number);
        for out in &frames {
            out.frame.encode(&mut buf);
        }
        self.outbox.push(buf.freeze());

        let tracked = frames
            .iter()
            .any(|o| o.frame.reliability.is_reliable() || o.receipt.is_some());
        if tracked {
            self.in_flight.insert(
                sequence_number,
                InFlight {
                    frames,
                    sent_at: now,
                },
            );
        }
    }

    /// Sequence number of the most recently sent FrameSet.
    pub fn last_sequence(&self) -> Option<u32> {
        self.last_sequence
    }

    /// The peer acknowledged these FrameSets.
    pub fn handle_ack(&mut self, sequences: &[u32]) {
        for seq in sequences {
            let Some(flight) = self.in_flight.remove(seq) else {
                continue;
            };
            for out in flight.frames {
                if let Some(id) = out.receipt {
                    self.settle_receipt(id);
                }
            }
        }
    }

    fn settle_receipt(&mut self, id: u32) {
        let Some(remaining) = self.pending_receipts.get_mut(&id) else {
            return;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.pending_receipts.remove(&id);
            self.receipts.push(DeliveryReceipt {
                id,
                delivered: true,
            });
        }
    }

    /// The peer reported these FrameSets lost: resend their reliable frames now.
    pub fn handle_nack(&mut self, sequences: &[u32], now: Instant) {
        let mut resend = Vec::new();
        for seq in sequences {
            if let Some(flight) = self.in_flight.remove(seq) {
                self.collect_lost(flight, &mut resend);
            }
        }
        if !resend.is_empty() {
            tracing::trace!(frames = resend.len(), "resending NACKed frames");
            self.transmit(resend, now);
        }
    }

    fn collect_lost(&mut self, flight: InFlight, resend: &mut Vec<Outgoing>) {
        for out in flight.frames {
            if out.frame.reliability.is_reliable() {
                resend.push(out);
            } else if let Some(id) = out.receipt {
                if self.pending_receipts.remove(&id).is_some() {
                    self.receipts.push(DeliveryReceipt {
                        id,
                        delivered: false,
                    });
                }
            }
        }
    }

    /// Periodic work: resend timed-out FrameSets, flush queued frames, write
    /// pending ACK/NACK datagrams and expire stale split assemblies.
    pub fn tick(&mut self, now: Instant) {
        let mut expired: Vec<u32> = self
            .in_flight
            .iter()
            .filter(|(_, f)| now.saturating_duration_since(f.sent_at) >= self.resend_timeout)
            .map(|(&seq, _)| seq)
            .collect();
        // Resend in original send order.
        expired.sort_by_key(|&seq| sequence::distance(self.next_sequence, seq));

        let mut resend = Vec::new();
        for seq in expired {
            if let Some(flight) = self.in_flight.remove(&seq) {
                self.collect_lost(flight, &mut resend);
            }
        }
        if !resend.is_empty() {
            tracing::trace!(frames = resend.len(), "resending timed-out frames");
            self.transmit(resend, now);
        }

        self.flush(now);
        self.flush_acks();

        let dropped = self.splits.expire(now, FRAGMENT_TIMEOUT);
        if dropped > 0 {
            tracing::debug!(dropped, "expired incomplete split packets");
        }
    }

    /// Write queued ACK and NACK records as datagrams.
    pub fn flush_acks(&mut self) {
        if !self.ack_queue.is_empty() {
            let mut seqs = std::mem::take(&mut self.ack_queue);
            let ack = AckNack::ack(&mut seqs);
            self.push_acknowledgements(ack);
        }
        if !self.nack_queue.is_empty() {
            let mut seqs = std::mem::take(&mut self.nack_queue);
            let nack = AckNack::nack(&mut seqs);
            self.push_acknowledgements(nack);
        }
    }

    fn push_acknowledgements(&mut self, datagram: AckNack) {
        for records in datagram.records.chunks(MAX_RECORDS_PER_DATAGRAM) {
            let part = AckNack {
                is_ack: datagram.is_ack,
                records: records.to_vec(),
            };
            self.outbox.push(part.to_bytes());
        }
    }

    /// Process an incoming FrameSet. Returns the payloads now deliverable,
    /// deduplicated, reassembled and in channel order.
    ///
    /// A reliable frame that finds its reassembly or ordering buffer full is
    /// not recorded, and the FrameSet is left unacknowledged so the peer
    /// resends it once there is room.
    pub fn handle_frameset(&mut self, frameset: FrameSet, now: Instant) -> Vec<Bytes> {
        let seq = frameset.sequence_number;
        let mut deferred = false;

        let mut delivered = Vec::new();
        for frame in frameset.frames {
            if let Some(index) = frame.reliable_index {
                if self.reliable_window.contains(index) {
                    tracing::trace!(index, "duplicate reliable frame");
                    continue;
                }
                if !self.has_room(&frame, index) {
                    deferred = true;
                    continue;
                }
                self.reliable_window.insert(index);
            }

            let body = match &frame.split {
                Some(split) => match self.splits.insert(split, frame.body.clone(), now) {
                    Ok(Some(whole)) => whole,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::debug!("dropping split fragment: {e}");
                        continue;
                    }
                },
                None => frame.body.clone(),
            };

            match (frame.reliability, frame.order_channel) {
                (r, Some(channel)) if r.is_ordered() => {
                    let index = frame.order_index.unwrap_or(0);
                    delivered.extend(self.ordering.insert_ordered(channel, index, body));
                }
                (r, Some(channel)) if r.is_sequenced() => {
                    let order = frame.order_index.unwrap_or(0);
                    let seq_index = frame.sequence_index.unwrap_or(0);
                    if let Some(body) =
                        self.ordering.insert_sequenced(channel, order, seq_index, body)
                    {
                        delivered.push(body);
                    }
                }
                _ => delivered.push(body),
            }
        }

        if deferred {
            tracing::debug!(seq, "receive buffers full, leaving FrameSet unacknowledged");
        }
        self.track_received(seq, !deferred);
        delivered
    }

    fn has_room(&self, frame: &Frame, reliable_index: u32) -> bool {
        if !self.reliable_window.has_room(reliable_index) {
            return false;
        }
        if let Some(split) = &frame.split {
            if !self.splits.has_room(split.id) {
                return false;
            }
        }
        match frame.order_channel {
            Some(channel) if frame.reliability.is_ordered() => self
                .ordering
                .has_room(channel, frame.order_index.unwrap_or(0)),
            _ => true,
        }
    }

    fn track_received(&mut self, seq: u32, ack: bool) {
        if ack {
            self.ack_queue.push(seq);
        }
        match self.highest_received {
            None => self.highest_received = Some(seq),
            Some(highest) if sequence::is_newer(seq, highest) => {
                let gap = sequence::distance(highest, seq) - 1;
                if gap > 0 && gap <= MAX_NACK_GAP {
                    let mut missing = sequence::next(highest);
                    while missing != seq {
                        self.nack_queue.push(missing);
                        missing = sequence::next(missing);
                    }
                }
                self.highest_received = Some(seq);
            }
            Some(_) => {
                // A late arrival fills a hole we were about to NACK.
                self.nack_queue.retain(|&s| s != seq);
            }
        }
    }

    /// Datagrams ready for the socket, in send order.
    pub fn drain_outbox(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_receipts(&mut self) -> Vec<DeliveryReceipt> {
        std::mem::take(&mut self.receipts)
    }

    /// FrameSets sent but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Drop everything buffered for this peer.
    pub fn clear(&mut self) {
        self.send_queue.clear();
        self.in_flight.clear();
        self.pending_receipts.clear();
        self.splits.clear();
        self.ack_queue.clear();
        self.nack_queue.clear();
    }
}
