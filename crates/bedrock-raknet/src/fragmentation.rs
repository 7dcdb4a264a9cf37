use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::constants::{MAX_CONCURRENT_SPLITS, MAX_SPLIT_COUNT};
use crate::error::RakNetError;
use crate::packet::frame::SplitInfo;

/// Reassembles split packets, keyed by split id.
#[derive(Default)]
pub struct SplitAssembler {
    pending: HashMap<u16, SplitBuffer>,
}

struct SplitBuffer {
    count: u32,
    chunks: Vec<Option<Bytes>>,
    received: u32,
    created_at: Instant,
}

impl SplitBuffer {
    fn new(count: u32, now: Instant) -> Self {
        Self {
            count,
            chunks: vec![None; count as usize],
            received: 0,
            created_at: now,
        }
    }

    fn concat(self) -> Bytes {
        let len = self.chunks.iter().flatten().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(len);
        for chunk in self.chunks.into_iter().flatten() {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }
}

impl SplitAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fragment of split `id` can be taken without exceeding the
    /// concurrent assembly limit.
    pub fn has_room(&self, id: u16) -> bool {
        self.pending.contains_key(&id) || self.pending.len() < MAX_CONCURRENT_SPLITS
    }

    /// Add one fragment. Returns the whole payload once the last missing
    /// fragment arrives. A repeated fragment is ignored.
    pub fn insert(
        &mut self,
        info: &SplitInfo,
        body: Bytes,
        now: Instant,
    ) -> Result<Option<Bytes>, RakNetError> {
        if info.count == 0 || info.count > MAX_SPLIT_COUNT {
            return Err(RakNetError::FragmentError(format!(
                "split count {} outside 1..={MAX_SPLIT_COUNT}",
                info.count
            )));
        }
        if info.index >= info.count {
            return Err(RakNetError::FragmentError(format!(
                "split index {} >= split count {}",
                info.index, info.count
            )));
        }
        if !self.pending.contains_key(&info.id) && self.pending.len() >= MAX_CONCURRENT_SPLITS {
            return Err(RakNetError::FragmentError(format!(
                "too many concurrent splits ({MAX_CONCURRENT_SPLITS})"
            )));
        }

        let buffer = self
            .pending
            .entry(info.id)
            .or_insert_with(|| SplitBuffer::new(info.count, now));

        if buffer.count != info.count {
            let expected = buffer.count;
            self.pending.remove(&info.id);
            return Err(RakNetError::FragmentError(format!(
                "split {} changed count from {expected} to {}",
                info.id, info.count
            )));
        }

        let slot = &mut buffer.chunks[info.index as usize];
        if slot.is_some() {
            return Ok(None);
        }
        *slot = Some(body);
        buffer.received += 1;

        if buffer.received < buffer.count {
            return Ok(None);
        }
        Ok(self.pending.remove(&info.id).map(SplitBuffer::concat))
    }

    /// Drop assemblies that have been incomplete for longer than `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, buf| now.saturating_duration_since(buf.created_at) < timeout);
        before - self.pending.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
