//! Layer descriptors and the media-type vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::digest::Digest;
use crate::ggml::GgmlDocument;

/// Payload role of a layer.
///
/// The four native roles have fixed wire strings. Anything else seen in a
/// manifest is carried through as [`MediaType::Other`] and never decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaType {
    Model,
    Projector,
    Adapter,
    Template,
    Other(String),
}

impl MediaType {
    pub const MODEL: &'static str = "application/vnd.ollama.image.model";
    pub const PROJECTOR: &'static str = "application/vnd.ollama.image.projector";
    pub const ADAPTER: &'static str = "application/vnd.ollama.image.adapter";
    pub const TEMPLATE: &'static str = "application/vnd.ollama.image.template";

    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Model => Self::MODEL,
            MediaType::Projector => Self::PROJECTOR,
            MediaType::Adapter => Self::ADAPTER,
            MediaType::Template => Self::TEMPLATE,
            MediaType::Other(s) => s,
        }
    }

    /// Whether layers of this type hold a GGUF/GGLA document.
    pub fn is_ggml(&self) -> bool {
        matches!(
            self,
            MediaType::Model | MediaType::Projector | MediaType::Adapter
        )
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        match s {
            Self::MODEL => MediaType::Model,
            Self::PROJECTOR => MediaType::Projector,
            Self::ADAPTER => MediaType::Adapter,
            Self::TEMPLATE => MediaType::Template,
            other => MediaType::Other(other.to_string()),
        }
    }
}

impl From<String> for MediaType {
    fn from(s: String) -> Self {
        MediaType::from(s.as_str())
    }
}

impl From<MediaType> for String {
    fn from(media_type: MediaType) -> Self {
        media_type.as_str().to_string()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, content-addressed unit of model data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub media_type: MediaType,
    pub digest: Digest,
    pub size: u64,
    /// Model name the layer was taken from, for manifest imports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// How the layer was produced, for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Layer {
    pub fn new(media_type: MediaType, digest: Digest, size: u64) -> Self {
        Self {
            media_type,
            digest,
            size,
            from: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// A layer plus the document decoded from its bytes, when it has one.
#[derive(Debug, Clone)]
pub struct ImportedLayer {
    pub layer: Layer,
    pub metadata: Option<Arc<GgmlDocument>>,
}

impl ImportedLayer {
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            metadata: None,
        }
    }

    pub fn with_metadata(layer: Layer, doc: GgmlDocument) -> Self {
        Self {
            layer,
            metadata: Some(Arc::new(doc)),
        }
    }
}

/// Ordered import output. Template layers always come last.
pub type LayeredModel = Vec<ImportedLayer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_wire_strings() {
        assert_eq!(
            MediaType::Projector.to_string(),
            "application/vnd.ollama.image.projector"
        );
        assert_eq!(
            MediaType::from("application/vnd.ollama.image.adapter"),
            MediaType::Adapter
        );
        assert_eq!(
            MediaType::from("application/vnd.ollama.image.license"),
            MediaType::Other("application/vnd.ollama.image.license".into())
        );
        assert!(!MediaType::Template.is_ggml());
        assert!(MediaType::Adapter.is_ggml());
    }

    #[test]
    fn test_layer_serializes_camel_case() {
        let layer = Layer::new(MediaType::Model, Digest::of_bytes(b"weights"), 7)
            .with_status("creating new layer");
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["mediaType"], MediaType::MODEL);
        assert_eq!(json["size"], 7);
        assert!(json.get("from").is_none());

        let back: Layer = serde_json::from_value(json).unwrap();
        assert_eq!(back, layer);
    }
}
