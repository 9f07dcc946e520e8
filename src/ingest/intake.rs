//! Per-frame path from raw text to the coalescing buffer.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::buffer::CoalescingBuffer;
use super::dedup::{DedupDecision, DedupTracker};
use super::normalizer::{Normalizer, Rejection, parse_frame};
use crate::coerce::Coerce;
use crate::model::PendingPayload;
use crate::telemetry::Telemetry;

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Payload is in the buffer; carries the buffer length afterwards.
    Buffered(usize),
    /// Not valid JSON or not an object.
    Malformed,
    /// Not a change we index (other object type, no id).
    Dropped(Rejection),
    /// Rejected by the dedup tracker.
    Duplicate(DedupDecision),
    /// Document could not be coerced into an indexable shape.
    CoercionFailed,
}

/// Owns the dedup state; only the ingestion loop drives it.
pub struct Intake {
    normalizer: Normalizer,
    dedup: DedupTracker,
    coercer: Arc<dyn Coerce>,
    buffer: Arc<Mutex<CoalescingBuffer>>,
    telemetry: Arc<Telemetry>,
}

impl Intake {
    pub fn new(
        normalizer: Normalizer,
        coercer: Arc<dyn Coerce>,
        buffer: Arc<Mutex<CoalescingBuffer>>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            normalizer,
            dedup: DedupTracker::new(),
            coercer,
            buffer,
            telemetry,
        }
    }

    pub fn dedup(&self) -> &DedupTracker {
        &self.dedup
    }

    pub async fn handle_frame(&mut self, raw: &str) -> IntakeOutcome {
        let value = match parse_frame(raw) {
            Ok(v) => v,
            Err(e) => {
                debug!("Dropping unparseable frame: {}", e);
                self.telemetry.record_malformed();
                return IntakeOutcome::Malformed;
            }
        };

        let event = match self.normalizer.classify(&value) {
            Ok(event) => event,
            Err(Rejection::NotAnObject) => {
                debug!("Dropping non-object frame");
                self.telemetry.record_malformed();
                return IntakeOutcome::Malformed;
            }
            Err(rejection) => {
                trace!("Dropping frame: {}", rejection);
                self.telemetry.record_dropped();
                return IntakeOutcome::Dropped(rejection);
            }
        };
        self.telemetry.record_received();

        let decision = self.dedup.check(&event);
        match decision {
            DedupDecision::Accepted => {}
            DedupDecision::Stale => {
                debug!("Skipping stale change for {}", event.id);
                self.telemetry.record_stale_skipped();
                return IntakeOutcome::Duplicate(decision);
            }
            DedupDecision::LegacyAfterTyped | DedupDecision::LegacyWithoutTimestamp => {
                debug!("Skipping legacy change for {} ({})", event.id, decision.as_str());
                self.telemetry.record_legacy_skipped();
                return IntakeOutcome::Duplicate(decision);
            }
        }

        let operation = event.effective_operation();
        // Changes without a document are indexed from the store of record.
        let document = match event.document.as_ref() {
            Some(raw) if !operation.is_delete() => match self.coercer.coerce(raw) {
                Some(doc) => Some(doc),
                None => {
                    warn!("Skipping {} for {}: document could not be coerced", operation, event.id);
                    self.telemetry.record_coercion_failed();
                    return IntakeOutcome::CoercionFailed;
                }
            },
            _ => None,
        };

        let payload = PendingPayload::new(event.id, operation, document);
        let len = {
            let mut buffer = self.buffer.lock().await;
            buffer.insert(payload);
            buffer.len()
        };
        self.telemetry.record_enqueued();
        IntakeOutcome::Buffered(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::ObjectCoercer;
    use crate::model::Operation;

    fn intake() -> (Intake, Arc<Mutex<CoalescingBuffer>>, Arc<Telemetry>) {
        let buffer = Arc::new(Mutex::new(CoalescingBuffer::new()));
        let telemetry = Arc::new(Telemetry::new());
        let intake = Intake::new(
            Normalizer::default(),
            Arc::new(ObjectCoercer),
            Arc::clone(&buffer),
            Arc::clone(&telemetry),
        );
        (intake, buffer, telemetry)
    }

    #[tokio::test]
    async fn test_out_of_order_update_rejected() {
        let (mut intake, buffer, _) = intake();
        let newer = r#"{"objectType":"ConceptScheme","id":"A","type":"update","document":{"id":"A","v":2},"modified":"2024-01-01T00:00:00Z"}"#;
        let older = r#"{"objectType":"ConceptScheme","id":"A","type":"update","document":{"id":"A","v":1},"modified":"2023-12-31T00:00:00Z"}"#;

        assert_eq!(intake.handle_frame(newer).await, IntakeOutcome::Buffered(1));
        assert_eq!(
            intake.handle_frame(older).await,
            IntakeOutcome::Duplicate(DedupDecision::Stale)
        );

        let buffer = buffer.lock().await;
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get("A").unwrap().document.as_ref().unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn test_malformed_and_dropped_frames() {
        let (mut intake, buffer, telemetry) = intake();

        assert_eq!(intake.handle_frame("{oops").await, IntakeOutcome::Malformed);
        assert_eq!(intake.handle_frame("[1,2]").await, IntakeOutcome::Malformed);
        assert!(matches!(
            intake.handle_frame(r#"{"objectType":"Concept","id":"A"}"#).await,
            IntakeOutcome::Dropped(Rejection::UnrecognizedType(_))
        ));
        assert_eq!(
            intake.handle_frame(r#"{"objectType":"ConceptScheme","type":"update"}"#).await,
            IntakeOutcome::Dropped(Rejection::MissingId)
        );

        assert!(buffer.lock().await.is_empty());
        let snap = telemetry.snapshot(0);
        assert_eq!(snap.malformed, 2);
        assert_eq!(snap.dropped, 2);
        assert_eq!(snap.received, 0);
    }

    #[tokio::test]
    async fn test_legacy_after_typed_counted() {
        let (mut intake, _, telemetry) = intake();
        let typed = r#"{"objectType":"ConceptScheme","id":"X","type":"create","document":{"id":"X"},"modified":"2024-01-01T00:00:00Z"}"#;
        let legacy = r#"{"objectType":"ConceptScheme","id":"X","document":{"id":"X"},"modified":"2024-06-01T00:00:00Z"}"#;

        assert_eq!(intake.handle_frame(typed).await, IntakeOutcome::Buffered(1));
        assert_eq!(
            intake.handle_frame(legacy).await,
            IntakeOutcome::Duplicate(DedupDecision::LegacyAfterTyped)
        );
        assert!(intake.dedup().has_typed("X"));
        assert_eq!(telemetry.snapshot(0).legacy_skipped, 1);
    }

    #[tokio::test]
    async fn test_legacy_buffered_as_update() {
        let (mut intake, buffer, _) = intake();
        let legacy = r#"{"objectType":"ConceptScheme","document":{"_id":"L","title":"Old"},"modified":"2024-01-01T00:00:00Z"}"#;

        assert_eq!(intake.handle_frame(legacy).await, IntakeOutcome::Buffered(1));
        assert_eq!(buffer.lock().await.get("L").unwrap().operation, Operation::Update);
    }

    #[tokio::test]
    async fn test_delete_needs_no_document() {
        let (mut intake, buffer, _) = intake();
        let delete = r#"{"objectType":"ConceptScheme","id":"D","type":"delete"}"#;

        assert_eq!(intake.handle_frame(delete).await, IntakeOutcome::Buffered(1));
        let buffer = buffer.lock().await;
        let entry = buffer.get("D").unwrap();
        assert_eq!(entry.operation, Operation::Delete);
        assert!(entry.document.is_none());
    }

    #[tokio::test]
    async fn test_coercion_failure_skips_event() {
        let (mut intake, buffer, telemetry) = intake();
        let scalar_document = r#"{"objectType":"ConceptScheme","id":"B","type":"create","document":"B"}"#;

        assert_eq!(intake.handle_frame(scalar_document).await, IntakeOutcome::CoercionFailed);
        assert!(buffer.lock().await.is_empty());
        assert_eq!(telemetry.snapshot(0).coercion_failed, 1);
    }

    #[tokio::test]
    async fn test_update_without_document_is_buffered() {
        let (mut intake, buffer, _) = intake();
        let bare = r#"{"objectType":"ConceptScheme","id":"A","type":"update","modified":"2024-01-01T00:00:00Z"}"#;

        assert_eq!(intake.handle_frame(bare).await, IntakeOutcome::Buffered(1));
        assert!(buffer.lock().await.get("A").unwrap().document.is_none());
    }

    #[tokio::test]
    async fn test_custom_coercer() {
        let buffer = Arc::new(Mutex::new(CoalescingBuffer::new()));
        let telemetry = Arc::new(Telemetry::new());
        let titled_only = |raw: &serde_json::Value| {
            raw.get("title").map(|t| serde_json::json!({ "title": t }))
        };
        let mut intake = Intake::new(
            Normalizer::default(),
            Arc::new(titled_only),
            Arc::clone(&buffer),
            Arc::clone(&telemetry),
        );

        let untitled = r#"{"objectType":"ConceptScheme","id":"A","type":"create","document":{"id":"A"}}"#;
        let titled = r#"{"objectType":"ConceptScheme","id":"B","type":"create","document":{"id":"B","title":"Colours","internal":true}}"#;

        assert_eq!(intake.handle_frame(untitled).await, IntakeOutcome::CoercionFailed);
        assert_eq!(intake.handle_frame(titled).await, IntakeOutcome::Buffered(1));
        assert_eq!(
            buffer.lock().await.get("B").unwrap().document,
            Some(serde_json::json!({"title": "Colours"}))
        );
    }
}
