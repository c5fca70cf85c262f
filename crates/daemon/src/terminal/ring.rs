// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;

/// Fixed-byte-budget ring of output frames, keyed by the session's
/// monotonic `seq` rather than a raw byte offset, so the WebSocket wire
/// contract (`{type:"output",seq,data}`) can address frames directly.
///
/// Oldest frames are discarded once `capacity_bytes` is exceeded; a cursor
/// requesting a `seq` older than what remains must be reported as expired
/// by the caller (`TERMINAL_CURSOR_EXPIRED`), not served short.
#[derive(Debug)]
pub struct OutputRing {
    frames: VecDeque<(u64, bytes::Bytes)>,
    capacity_bytes: usize,
    used_bytes: usize,
    next_seq: u64,
}

impl OutputRing {
    pub fn new(capacity_bytes: usize) -> Self {
        Self { frames: VecDeque::new(), capacity_bytes, used_bytes: 0, next_seq: 0 }
    }

    /// Append a chunk, assigning it the next sequence number, and evict the
    /// oldest frames until the ring is back under budget.
    pub fn push(&mut self, data: bytes::Bytes) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.used_bytes += data.len();
        self.frames.push_back((seq, data));
        while self.used_bytes > self.capacity_bytes {
            if let Some((_, evicted)) = self.frames.pop_front() {
                self.used_bytes -= evicted.len();
            } else {
                break;
            }
        }
        seq
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// The lowest seq still retained, or `next_seq` if the ring is empty.
    pub fn oldest_seq(&self) -> u64 {
        self.frames.front().map(|(seq, _)| *seq).unwrap_or(self.next_seq)
    }

    /// Whether `from_seq` can be served by [`Self::replay_from`] without a
    /// gap (i.e. `from_seq` is not older than the oldest retained frame).
    pub fn can_replay_from(&self, from_seq: u64) -> bool {
        from_seq >= self.oldest_seq() || from_seq >= self.next_seq
    }

    /// All frames with `seq > from_seq`, in order. Caller must have checked
    /// [`Self::can_replay_from`] first.
    pub fn replay_from(&self, from_seq: u64) -> Vec<(u64, bytes::Bytes)> {
        self.frames.iter().filter(|(seq, _)| *seq > from_seq).cloned().collect()
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
