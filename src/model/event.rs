use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four operation tokens a well-formed producer attaches to a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Replace,
    Delete,
}

impl Operation {
    /// Parse an operation token. Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "replace" => Some(Self::Replace),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }

    #[inline]
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a change came from a current producer or an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Carries an explicit operation token.
    Typed(Operation),
    /// No operation token; older producer format.
    Legacy,
}

/// A normalized change notification. Built by the normalizer, consumed
/// immediately by the dedup tracker, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub id: String,
    pub kind: EventKind,
    pub document: Option<Value>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    #[inline]
    pub fn is_legacy(&self) -> bool {
        matches!(self.kind, EventKind::Legacy)
    }

    /// Explicit operation, if the producer sent one.
    pub fn operation(&self) -> Option<Operation> {
        match self.kind {
            EventKind::Typed(op) => Some(op),
            EventKind::Legacy => None,
        }
    }

    /// Operation used when buffering. Legacy events are upserts.
    pub fn effective_operation(&self) -> Operation {
        self.operation().unwrap_or(Operation::Update)
    }

    /// Modification time in epoch milliseconds.
    pub fn modified_ms(&self) -> Option<i64> {
        self.modified_at.map(|ts| ts.timestamp_millis())
    }
}
