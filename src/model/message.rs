use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field carrying the domain-type discriminator.
pub const OBJECT_TYPE_FIELD: &str = "objectType";
/// Explicit id at the top level of a frame.
pub const ID_FIELD: &str = "id";
/// Operation token.
pub const TYPE_FIELD: &str = "type";
/// Embedded document.
pub const DOCUMENT_FIELD: &str = "document";
/// Modification timestamp (ISO-8601), on the frame or the document.
pub const MODIFIED_FIELD: &str = "modified";
/// Internal store identifier inside the document.
pub const INTERNAL_ID_FIELD: &str = "_id";

/// Change notification as sent by the upstream store.
///
/// The normalizer reads frames as loose JSON so that malformed fields are
/// tolerated; this type documents the wire shape and is used to produce
/// well-formed frames.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl InboundMessage {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn operation(mut self, token: impl Into<String>) -> Self {
        self.r#type = Some(token.into());
        self
    }

    pub fn document(mut self, document: Value) -> Self {
        self.document = Some(document);
        self
    }

    pub fn modified(mut self, modified: impl Into<String>) -> Self {
        self.modified = Some(modified.into());
        self
    }

    /// Serialize to the text frame the stream carries.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_field_names() {
        let frame = InboundMessage::new("ConceptScheme")
            .id("A")
            .operation("update")
            .modified("2024-01-01T00:00:00Z")
            .to_frame()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value[OBJECT_TYPE_FIELD], "ConceptScheme");
        assert_eq!(value[ID_FIELD], "A");
        assert_eq!(value[TYPE_FIELD], "update");
        assert_eq!(value[MODIFIED_FIELD], "2024-01-01T00:00:00Z");
        assert!(value.get(DOCUMENT_FIELD).is_none());
    }
}
