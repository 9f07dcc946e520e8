//! Per-id modification tracking that gates which events get buffered.

use std::collections::{HashMap, HashSet};

use crate::model::ChangeEvent;

/// Result of checking an event against the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Accepted,
    /// `modified_at` is not newer than the last accepted one for the id.
    Stale,
    /// Legacy event for an id that already produced a typed event.
    LegacyAfterTyped,
    /// Legacy event without a timestamp; cannot be ordered.
    LegacyWithoutTimestamp,
}

impl DedupDecision {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Stale => "stale",
            Self::LegacyAfterTyped => "legacy_after_typed",
            Self::LegacyWithoutTimestamp => "legacy_without_timestamp",
        }
    }
}

/// Last accepted modification time per id, plus the ids that have ever
/// sent a typed event. Entries are never evicted.
#[derive(Debug, Default)]
pub struct DedupTracker {
    last_seen_ms: HashMap<String, i64>,
    typed: HashSet<String>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the event should be buffered. Updates tracker state.
    pub fn should_process(&mut self, event: &ChangeEvent) -> bool {
        self.check(event).is_accepted()
    }

    /// Check an event and record it when accepted.
    pub fn check(&mut self, event: &ChangeEvent) -> DedupDecision {
        if event.is_legacy() {
            if self.typed.contains(&event.id) {
                return DedupDecision::LegacyAfterTyped;
            }
            let Some(modified) = event.modified_ms() else {
                return DedupDecision::LegacyWithoutTimestamp;
            };
            return self.advance(&event.id, modified);
        }

        // Typed events poison later legacy events even when rejected below.
        if !self.typed.contains(&event.id) {
            self.typed.insert(event.id.clone());
        }

        match event.modified_ms() {
            Some(modified) => self.advance(&event.id, modified),
            None => DedupDecision::Accepted,
        }
    }

    /// Last accepted modification time for an id, in epoch milliseconds.
    pub fn last_seen(&self, id: &str) -> Option<i64> {
        self.last_seen_ms.get(id).copied()
    }

    pub fn has_typed(&self, id: &str) -> bool {
        self.typed.contains(id)
    }

    /// Number of distinct ids with any tracked state.
    pub fn tracked_ids(&self) -> usize {
        self.last_seen_ms
            .keys()
            .filter(|id| !self.typed.contains(*id))
            .count()
            + self.typed.len()
    }

    fn advance(&mut self, id: &str, modified: i64) -> DedupDecision {
        match self.last_seen_ms.get_mut(id) {
            Some(last) if modified <= *last => DedupDecision::Stale,
            Some(last) => {
                *last = modified;
                DedupDecision::Accepted
            }
            None => {
                self.last_seen_ms.insert(id.to_string(), modified);
                DedupDecision::Accepted
            }
        }
    }
}
