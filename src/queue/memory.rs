use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::JobQueue;
use crate::error::QueueError;
use crate::model::Job;

/// In-process queue that records every accepted batch.
///
/// Useful for dry runs and tests; can be switched to refuse submissions
/// to simulate an outage.
#[derive(Default)]
pub struct MemoryQueue {
    batches: Mutex<Vec<Vec<Job>>>,
    unavailable: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (`true`) or accept (`false`) further submissions.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every accepted batch, in submission order.
    pub async fn batches(&self) -> Vec<Vec<Job>> {
        self.batches.lock().await.clone()
    }

    pub async fn batch_count(&self) -> usize {
        self.batches.lock().await.len()
    }

    pub async fn job_count(&self) -> usize {
        self.batches.lock().await.iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn submit_batch(&self, jobs: &[Job]) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory queue offline".to_string()));
        }
        self.batches.lock().await.push(jobs.to_vec());
        Ok(())
    }
}
