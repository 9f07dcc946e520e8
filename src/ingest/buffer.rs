//! Keyed accumulator holding the latest pending payload per id.

use std::collections::{HashMap, VecDeque};

use crate::model::PendingPayload;

/// Buffer statistics for monitoring and debugging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub payloads_inserted: u64,
    pub payloads_coalesced: u64,
    pub payloads_drained: u64,
    pub payloads_restored: u64,
}

/// Coalescing buffer with O(1) keyed lookup and FIFO drain order.
///
/// A newer payload for an id replaces the pending one in place and keeps
/// the id's original position in the drain order.
pub struct CoalescingBuffer {
    /// Main storage keyed by entity id
    pending: HashMap<String, PendingPayload>,
    /// First-arrival order of the ids in `pending`
    order: VecDeque<String>,
    stats: BufferStats,
}

impl CoalescingBuffer {
    pub fn new() -> Self {
        Self {
            pending: HashMap::with_capacity(128),
            order: VecDeque::with_capacity(128),
            stats: BufferStats::default(),
        }
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    /// Number of distinct ids pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PendingPayload> {
        self.pending.get(id)
    }

    /// Insert a payload, replacing any pending payload for the same id.
    /// Returns `true` if an earlier payload was overwritten.
    pub fn insert(&mut self, payload: PendingPayload) -> bool {
        self.stats.payloads_inserted += 1;

        if let Some(existing) = self.pending.get_mut(&payload.id) {
            *existing = payload;
            self.stats.payloads_coalesced += 1;
            return true;
        }

        self.order.push_back(payload.id.clone());
        self.pending.insert(payload.id.clone(), payload);
        false
    }

    /// Take every pending payload, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<PendingPayload> {
        let mut drained = Vec::with_capacity(self.pending.len());
        while let Some(id) = self.order.pop_front() {
            if let Some(payload) = self.pending.remove(&id) {
                drained.push(payload);
            }
        }
        self.stats.payloads_drained += drained.len() as u64;
        drained
    }

    /// Put back payloads from a failed submission. An id that received a
    /// newer payload in the meantime keeps the newer one.
    /// Returns the number of payloads restored.
    pub fn restore(&mut self, payloads: Vec<PendingPayload>) -> usize {
        let mut restored = 0;
        for payload in payloads {
            if self.pending.contains_key(&payload.id) {
                continue;
            }
            self.order.push_back(payload.id.clone());
            self.pending.insert(payload.id.clone(), payload);
            restored += 1;
        }
        self.stats.payloads_restored += restored as u64;
        restored
    }
}

impl Default for CoalescingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
