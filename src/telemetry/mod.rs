//! Status telemetry: lock-free counters and timestamps updated by every
//! pipeline stage, read as an owned [`StatusSnapshot`].

mod snapshot;

pub use snapshot::StatusSnapshot;

use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::network::ConnectionState;

/// Shared telemetry sink. Updates never block on readers.
#[derive(Debug, Default)]
pub struct Telemetry {
    /// Atomic connection state (see [`ConnectionState::as_u8`])
    state: AtomicU8,
    connects: AtomicU64,
    reconnects: AtomicU64,
    heartbeats_sent: AtomicU64,

    // Epoch milliseconds, 0 = never.
    last_open_ms: AtomicI64,
    last_close_ms: AtomicI64,
    last_error_ms: AtomicI64,
    last_message_ms: AtomicI64,
    last_heartbeat_ms: AtomicI64,

    received: AtomicU64,
    enqueued: AtomicU64,
    legacy_skipped: AtomicU64,
    stale_skipped: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    coercion_failed: AtomicU64,
    batches_submitted: AtomicU64,
    jobs_submitted: AtomicU64,
    batches_failed: AtomicU64,

    reasons: RwLock<Reasons>,
}

#[derive(Debug, Default, Clone)]
struct Reasons {
    last_close: Option<String>,
    last_error: Option<String>,
    last_queue_error: Option<String>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn load_ts(cell: &AtomicI64) -> Option<DateTime<Utc>> {
    match cell.load(Ordering::Relaxed) {
        0 => None,
        ms => DateTime::from_timestamp_millis(ms),
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub fn record_open(&self) {
        bump(&self.connects);
        self.last_open_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        bump(&self.reconnects);
    }

    pub fn record_close(&self, reason: &str) {
        self.last_close_ms.store(now_ms(), Ordering::Relaxed);
        self.with_reasons(|r| r.last_close = Some(reason.to_string()));
    }

    pub fn record_error(&self, reason: &str) {
        self.last_error_ms.store(now_ms(), Ordering::Relaxed);
        self.with_reasons(|r| r.last_error = Some(reason.to_string()));
    }

    /// Any inbound frame from the peer.
    pub fn record_message(&self) {
        self.last_message_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_heartbeat_sent(&self) {
        bump(&self.heartbeats_sent);
    }

    /// Peer acknowledged a liveness probe.
    pub fn record_heartbeat_ack(&self) {
        self.last_heartbeat_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// A change frame for the recognized type was normalized.
    pub fn record_received(&self) {
        bump(&self.received);
    }

    /// A payload was placed in the coalescing buffer.
    pub fn record_enqueued(&self) {
        bump(&self.enqueued);
    }

    pub fn record_legacy_skipped(&self) {
        bump(&self.legacy_skipped);
    }

    pub fn record_stale_skipped(&self) {
        bump(&self.stale_skipped);
    }

    /// Well-formed frame that is not for the recognized type, or has no id.
    pub fn record_dropped(&self) {
        bump(&self.dropped);
    }

    /// Frame that is not valid JSON or not an object.
    pub fn record_malformed(&self) {
        bump(&self.malformed);
    }

    pub fn record_coercion_failed(&self) {
        bump(&self.coercion_failed);
    }

    pub fn record_batch_submitted(&self, jobs: usize) {
        bump(&self.batches_submitted);
        self.jobs_submitted.fetch_add(jobs as u64, Ordering::Relaxed);
    }

    pub fn record_batch_failed(&self, reason: &str) {
        bump(&self.batches_failed);
        self.with_reasons(|r| r.last_queue_error = Some(reason.to_string()));
    }

    /// Owned point-in-time view. `buffer_size` is read by the caller at
    /// snapshot time.
    /// Buffer counters are left at zero; the pipeline fills them in from
    /// the buffer it owns.
    pub fn snapshot(&self, buffer_size: usize) -> StatusSnapshot {
        let reasons = self
            .reasons
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let state = self.connection_state();

        StatusSnapshot {
            connected: state.is_connected(),
            connection_state: state.as_str(),
            connect_count: self.connects.load(Ordering::Relaxed),
            reconnect_count: self.reconnects.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            last_open_at: load_ts(&self.last_open_ms),
            last_close_at: load_ts(&self.last_close_ms),
            last_close_reason: reasons.last_close,
            last_error_at: load_ts(&self.last_error_ms),
            last_error: reasons.last_error,
            last_message_at: load_ts(&self.last_message_ms),
            last_heartbeat_at: load_ts(&self.last_heartbeat_ms),
            received: self.received.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            legacy_skipped: self.legacy_skipped.load(Ordering::Relaxed),
            stale_skipped: self.stale_skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            coercion_failed: self.coercion_failed.load(Ordering::Relaxed),
            batches_submitted: self.batches_submitted.load(Ordering::Relaxed),
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            last_queue_error: reasons.last_queue_error,
            buffer_size,
            payloads_coalesced: 0,
            payloads_restored: 0,
        }
    }

    fn with_reasons(&self, update: impl FnOnce(&mut Reasons)) {
        let mut reasons = self.reasons.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut reasons);
    }
}
