use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time status of the ingestion pipeline.
///
/// Owned copy; safe to serialize directly as a status/health response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub connected: bool,
    pub connection_state: &'static str,
    pub connect_count: u64,
    pub reconnect_count: u64,
    pub heartbeats_sent: u64,
    pub last_open_at: Option<DateTime<Utc>>,
    pub last_close_at: Option<DateTime<Utc>>,
    pub last_close_reason: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub received: u64,
    pub enqueued: u64,
    pub legacy_skipped: u64,
    pub stale_skipped: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub coercion_failed: u64,
    pub batches_submitted: u64,
    pub jobs_submitted: u64,
    pub batches_failed: u64,
    pub last_queue_error: Option<String>,
    /// Payloads waiting in the coalescing buffer when the snapshot was taken.
    pub buffer_size: usize,
    /// Changes that replaced a pending payload for the same id.
    pub payloads_coalesced: u64,
    /// Payloads put back after a failed submission.
    pub payloads_restored: u64,
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (connects {}, reconnects {}) received {}, enqueued {}, buffered {}, batches {}/{} failed",
            self.connection_state,
            self.connect_count,
            self.reconnect_count,
            self.received,
            self.enqueued,
            self.buffer_size,
            self.batches_submitted,
            self.batches_failed
        )
    }
}
