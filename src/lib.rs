pub mod coerce;
pub mod config;
mod error;
pub mod ingest;
pub mod model;
pub mod network;
pub mod pipeline;
pub mod queue;
pub mod telemetry;

pub use coerce::{Coerce, ObjectCoercer};
pub use config::PipelineConfig;
pub use error::{IngestError, QueueError};
pub use ingest::{BatchDispatcher, CoalescingBuffer, DedupTracker, FlushOutcome, Normalizer};
pub use model::{ChangeEvent, InboundMessage, Job, Operation, PendingPayload};
pub use network::{ConnectionManager, ConnectionState};
pub use pipeline::IngestPipeline;
pub use queue::{HttpJobQueue, JobQueue, MemoryQueue};
pub use telemetry::{StatusSnapshot, Telemetry};
