//! Seam to the external job queue that feeds the indexing workers.

mod http;
mod memory;

pub use http::HttpJobQueue;
pub use memory::MemoryQueue;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::model::Job;

/// Bulk submission contract of the downstream queue.
///
/// An `Err` means nothing from the batch was accepted; the dispatcher puts
/// every payload back into the buffer and retries on the next flush.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit_batch(&self, jobs: &[Job]) -> Result<(), QueueError>;
}
