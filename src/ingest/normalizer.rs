//! Normalization rules for inbound change frames.
//!
//! Frames are read as loose JSON. Everything that is not a change for the
//! recognized object type is rejected here and never reaches the dedup
//! tracker.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::IngestError;
use crate::model::message::{
    DOCUMENT_FIELD, ID_FIELD, INTERNAL_ID_FIELD, MODIFIED_FIELD, OBJECT_TYPE_FIELD, TYPE_FIELD,
};
use crate::model::{ChangeEvent, EventKind, Operation};

/// Object type emitted by the upstream store for indexed entities.
pub const DEFAULT_OBJECT_TYPE: &str = "ConceptScheme";

/// Why a frame was not turned into a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Frame is valid JSON but not an object.
    NotAnObject,
    /// `objectType` missing or not the recognized type.
    UnrecognizedType(Option<String>),
    /// No usable id at the top level or in the document.
    MissingId,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "frame is not a JSON object"),
            Self::UnrecognizedType(Some(t)) => write!(f, "unrecognized object type {t:?}"),
            Self::UnrecognizedType(None) => write!(f, "missing object type"),
            Self::MissingId => write!(f, "no id in frame or document"),
        }
    }
}

/// Parse a text frame into JSON.
pub fn parse_frame(raw: &str) -> Result<Value, IngestError> {
    Ok(serde_json::from_str(raw)?)
}

/// Turns raw frames into [`ChangeEvent`]s. Pure.
#[derive(Debug, Clone)]
pub struct Normalizer {
    object_type: String,
}

impl Normalizer {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Normalize a frame, discarding the rejection reason.
    pub fn normalize(&self, raw: &Value) -> Option<ChangeEvent> {
        self.classify(raw).ok()
    }

    /// Normalize a frame, reporting why it was rejected.
    pub fn classify(&self, raw: &Value) -> Result<ChangeEvent, Rejection> {
        let frame = raw.as_object().ok_or(Rejection::NotAnObject)?;

        match frame.get(OBJECT_TYPE_FIELD).and_then(Value::as_str) {
            Some(t) if t == self.object_type => {}
            other => return Err(Rejection::UnrecognizedType(other.map(str::to_string))),
        }

        let document = frame.get(DOCUMENT_FIELD).filter(|d| !d.is_null());

        let id = id_from(frame.get(ID_FIELD))
            .or_else(|| document.and_then(|d| id_from(d.get(ID_FIELD))))
            .or_else(|| document.and_then(|d| id_from(d.get(INTERNAL_ID_FIELD))))
            .ok_or(Rejection::MissingId)?;

        let kind = frame
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .and_then(Operation::from_token)
            .map(EventKind::Typed)
            .unwrap_or(EventKind::Legacy);

        let modified_at = document
            .and_then(|d| timestamp_from(d.get(MODIFIED_FIELD)))
            .or_else(|| timestamp_from(frame.get(MODIFIED_FIELD)));

        Ok(ChangeEvent {
            id,
            kind,
            document: document.cloned(),
            modified_at,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_OBJECT_TYPE)
    }
}

/// Non-empty string ids, or integer ids rendered as strings.
fn id_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_from(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let text = value?.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::default()
    }

    #[test]
    fn test_typed_update() {
        let raw = json!({
            "objectType": "ConceptScheme",
            "id": "A",
            "type": "update",
            "document": {"id": "A", "title": "Colours"},
            "modified": "2024-01-01T00:00:00Z"
        });
        let event = normalizer().normalize(&raw).unwrap();

        assert_eq!(event.id, "A");
        assert_eq!(event.kind, EventKind::Typed(Operation::Update));
        assert_eq!(event.document.as_ref().unwrap()["title"], "Colours");
        assert_eq!(event.modified_ms(), Some(1_704_067_200_000));
    }

    #[test]
    fn test_rejects_non_object() {
        assert_eq!(
            normalizer().classify(&json!([1, 2, 3])),
            Err(Rejection::NotAnObject)
        );
        assert!(normalizer().normalize(&json!("ConceptScheme")).is_none());
    }

    #[test]
    fn test_rejects_other_object_types() {
        let raw = json!({"objectType": "Concept", "id": "A", "type": "create"});
        assert_eq!(
            normalizer().classify(&raw),
            Err(Rejection::UnrecognizedType(Some("Concept".to_string())))
        );

        let raw = json!({"id": "A", "type": "create"});
        assert_eq!(
            normalizer().classify(&raw),
            Err(Rejection::UnrecognizedType(None))
        );
    }

    #[test]
    fn test_id_priority() {
        let raw = json!({
            "objectType": "ConceptScheme",
            "id": "top",
            "document": {"id": "doc", "_id": "internal"}
        });
        assert_eq!(normalizer().normalize(&raw).unwrap().id, "top");

        let raw = json!({
            "objectType": "ConceptScheme",
            "document": {"id": "doc", "_id": "internal"}
        });
        assert_eq!(normalizer().normalize(&raw).unwrap().id, "doc");

        let raw = json!({
            "objectType": "ConceptScheme",
            "id": "",
            "document": {"_id": "internal"}
        });
        assert_eq!(normalizer().normalize(&raw).unwrap().id, "internal");

        let raw = json!({"objectType": "ConceptScheme", "document": {"_id": 42}});
        assert_eq!(normalizer().normalize(&raw).unwrap().id, "42");
    }

    #[test]
    fn test_missing_id() {
        let raw = json!({"objectType": "ConceptScheme", "type": "update", "document": {}});
        assert_eq!(normalizer().classify(&raw), Err(Rejection::MissingId));
    }

    #[test]
    fn test_unknown_operation_is_legacy() {
        let raw = json!({"objectType": "ConceptScheme", "id": "A", "type": "upsert"});
        assert!(normalizer().normalize(&raw).unwrap().is_legacy());

        let raw = json!({"objectType": "ConceptScheme", "id": "A"});
        assert!(normalizer().normalize(&raw).unwrap().is_legacy());
    }

    #[test]
    fn test_modified_prefers_document() {
        let raw = json!({
            "objectType": "ConceptScheme",
            "id": "A",
            "document": {"modified": "2024-02-01T00:00:00Z"},
            "modified": "2024-01-01T00:00:00Z"
        });
        let event = normalizer().normalize(&raw).unwrap();
        assert_eq!(
            event.modified_at.unwrap().to_rfc3339(),
            "2024-02-01T00:00:00+00:00"
        );

        let raw = json!({
            "objectType": "ConceptScheme",
            "id": "A",
            "document": {"modified": "not a date"},
            "modified": "2024-01-01T00:00:00Z"
        });
        let event = normalizer().normalize(&raw).unwrap();
        assert_eq!(event.modified_ms(), Some(1_704_067_200_000));

        let raw = json!({"objectType": "ConceptScheme", "id": "A"});
        assert!(normalizer().normalize(&raw).unwrap().modified_at.is_none());
    }

    #[test]
    fn test_custom_object_type() {
        let normalizer = Normalizer::new("Collection");
        let raw = json!({"objectType": "Collection", "id": "C", "type": "delete"});
        let event = normalizer.normalize(&raw).unwrap();
        assert_eq!(event.operation(), Some(Operation::Delete));
    }

    #[test]
    fn test_parse_frame_errors() {
        assert!(parse_frame("{not json").is_err());
        assert!(parse_frame(r#"{"objectType":"ConceptScheme"}"#).is_ok());
    }
}
