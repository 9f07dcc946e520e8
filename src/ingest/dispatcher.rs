//! The BatchDispatcher drains the coalescing buffer into the job queue.
//!
//! Flushes are single-flight: a flush requested while another one is
//! submitting returns immediately. A failed submission puts every drained
//! payload back so the next flush retries it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::buffer::CoalescingBuffer;
use crate::model::Job;
use crate::queue::JobQueue;
use crate::telemetry::Telemetry;

/// What a call to [`BatchDispatcher::flush`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush was already in progress.
    Skipped,
    /// Nothing was buffered.
    Empty,
    /// The queue accepted this many jobs.
    Submitted(usize),
    /// The queue was unavailable; this many payloads were put back.
    Requeued(usize),
}

pub struct BatchDispatcher {
    buffer: Arc<Mutex<CoalescingBuffer>>,
    queue: Arc<dyn JobQueue>,
    telemetry: Arc<Telemetry>,
    flushing: AtomicBool,
}

/// Clears the single-flight flag even if the flush future is dropped.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchDispatcher {
    pub fn new(
        buffer: Arc<Mutex<CoalescingBuffer>>,
        queue: Arc<dyn JobQueue>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            buffer,
            queue,
            telemetry,
            flushing: AtomicBool::new(false),
        }
    }

    pub fn buffer(&self) -> &Arc<Mutex<CoalescingBuffer>> {
        &self.buffer
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Drain the buffer and submit it as one batch.
    ///
    /// Never returns an error: queue failures are logged, recorded in
    /// telemetry, and the payloads are restored.
    pub async fn flush(&self) -> FlushOutcome {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Flush already in progress, skipping");
            return FlushOutcome::Skipped;
        }
        let _guard = FlushGuard(&self.flushing);

        let drained = self.buffer.lock().await.drain();
        if drained.is_empty() {
            return FlushOutcome::Empty;
        }

        let jobs: Vec<Job> = drained.into_iter().map(Job::from).collect();
        let count = jobs.len();

        match self.queue.submit_batch(&jobs).await {
            Ok(()) => {
                self.telemetry.record_batch_submitted(count);
                debug!("Submitted batch of {} jobs", count);
                FlushOutcome::Submitted(count)
            }
            Err(e) => {
                warn!("Queue unavailable, restoring {} payloads: {}", count, e);
                self.telemetry.record_batch_failed(&e.to_string());
                let payloads = jobs.into_iter().map(|job| job.data).collect();
                let restored = self.buffer.lock().await.restore(payloads);
                FlushOutcome::Requeued(restored)
            }
        }
    }
}
