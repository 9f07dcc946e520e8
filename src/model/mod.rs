pub mod event;
pub mod job;
pub mod message;

pub use event::{ChangeEvent, EventKind, Operation};
pub use job::{Job, JobOptions, PendingPayload};
pub use message::InboundMessage;
