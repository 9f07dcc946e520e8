//! Buffered payloads and the job shape handed to the external queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::Operation;

/// Latest pending state for one id inside the current coalescing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayload {
    pub id: String,
    pub operation: Operation,
    /// Coerced document. `None` for deletes and for changes that carried
    /// no document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    pub received_at: DateTime<Utc>,
}

impl PendingPayload {
    pub fn new(id: String, operation: Operation, document: Option<Value>) -> Self {
        Self {
            id,
            operation,
            document,
            received_at: Utc::now(),
        }
    }
}

/// Retention flags sent with every job. Jobs are kept after completion
/// and failure for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            remove_on_complete: false,
            remove_on_fail: false,
        }
    }
}

/// One unit of work for the indexing worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: Operation,
    pub data: PendingPayload,
    pub opts: JobOptions,
}

impl From<PendingPayload> for Job {
    fn from(payload: PendingPayload) -> Self {
        Self {
            name: payload.operation,
            data: payload,
            opts: JobOptions::default(),
        }
    }
}
