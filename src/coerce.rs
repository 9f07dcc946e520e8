//! Turns a raw change document into the canonical document that is indexed.

use serde_json::Value;

/// Document coercion collaborator. `None` means the document cannot be
/// indexed; the event is skipped and the pipeline moves on.
pub trait Coerce: Send + Sync {
    fn coerce(&self, raw: &Value) -> Option<Value>;
}

impl<F> Coerce for F
where
    F: Fn(&Value) -> Option<Value> + Send + Sync,
{
    fn coerce(&self, raw: &Value) -> Option<Value> {
        self(raw)
    }
}

/// Accepts JSON objects as they are and rejects everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectCoercer;

impl Coerce for ObjectCoercer {
    fn coerce(&self, raw: &Value) -> Option<Value> {
        raw.is_object().then(|| raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_coercer() {
        assert!(ObjectCoercer.coerce(&json!({"id": "A"})).is_some());
        assert!(ObjectCoercer.coerce(&json!("A")).is_none());
        assert!(ObjectCoercer.coerce(&Value::Null).is_none());
    }

    #[test]
    fn test_closure_coercer() {
        let titled = |raw: &Value| raw.get("title").map(|t| json!({ "title": t }));
        assert_eq!(
            titled.coerce(&json!({"title": "Colours", "x": 1})),
            Some(json!({"title": "Colours"}))
        );
        assert!(titled.coerce(&json!({})).is_none());
    }
}
