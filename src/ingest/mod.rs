//! Change ingestion: normalization, deduplication, coalescing and batched
//! dispatch.
//!
//! # Flow
//!
//! Each inbound frame goes through [`Normalizer`] (rejects anything that is
//! not a change for the recognized object type), the [`DedupTracker`]
//! (rejects stale and untrustworthy legacy changes), the coercer, and lands
//! in the [`CoalescingBuffer`] where a newer change for the same id replaces
//! the pending one. The [`BatchDispatcher`] drains the buffer into the job
//! queue when it reaches the batch size or on the batch timer.

pub mod buffer;
pub mod dedup;
pub mod dispatcher;
pub mod intake;
pub mod normalizer;

pub use buffer::{BufferStats, CoalescingBuffer};
pub use dedup::{DedupDecision, DedupTracker};
pub use dispatcher::{BatchDispatcher, FlushOutcome};
pub use intake::{Intake, IntakeOutcome};
pub use normalizer::{Normalizer, Rejection};
