//! Multi-document GGUF/GGLA import.

use tracing::debug;

use super::{blocking, enter, ImportStage, Importer};
use crate::cancel::CancellationToken;
use crate::config::ImportConfig;
use crate::error::Result;
use crate::ggml::source::SharedSource;
use crate::ggml::{decode_document, Container, GgmlDocument};
use crate::layer::{ImportedLayer, LayeredModel, MediaType};
use crate::normalize::normalize;
use crate::progress::{report, ProgressFn};

/// Media type a decoded document should be stored under.
pub(crate) fn classify(doc: &GgmlDocument, config: &ImportConfig) -> MediaType {
    if doc.container == Container::Ggla {
        MediaType::Adapter
    } else if doc.architecture() == Some(config.projector_architecture.as_str()) {
        MediaType::Projector
    } else {
        MediaType::Model
    }
}

impl Importer {
    /// Decode documents back to back from offset 0 until the source ends,
    /// storing one layer per document in stream order.
    pub(super) async fn parse_binary(
        &self,
        src: SharedSource,
        label: &str,
        progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<LayeredModel> {
        let inner = self.inner.clone();
        let label = label.to_string();
        let cancel = cancel.clone();
        blocking(move || {
            let mut layers = Vec::new();
            let mut offset = 0u64;
            loop {
                cancel.check()?;
                enter(ImportStage::ParsingBinary, &label);
                let Some(doc) = decode_document(src.as_ref(), offset, &inner.config)? else {
                    break;
                };
                let media_type = classify(&doc, &inner.config);
                debug!(
                    "Decoded {} v{} document at {}..{} as {} with {} tensors",
                    doc.container,
                    doc.version,
                    doc.start,
                    doc.end,
                    media_type,
                    doc.tensors.len()
                );

                enter(ImportStage::Normalizing, &label);
                let mut normalized = normalize(&src, &doc)?;

                enter(ImportStage::Materializing, &label);
                let layer = inner
                    .materializer
                    .materialize(&mut normalized, media_type, &cancel)?;
                if let Some(status) = &layer.status {
                    report(&progress, status.clone());
                }

                offset = doc.end;
                layers.push(ImportedLayer::with_metadata(layer, doc));
            }
            Ok(layers)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ggml::fixture::{GgufFixture, GglaFixture};
    use bytes::Bytes;

    fn decode(data: Vec<u8>) -> GgmlDocument {
        let src = Bytes::from(data);
        decode_document(&src, 0, &ImportConfig::default())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_classify() {
        let config = ImportConfig::default();
        let model = decode(
            GgufFixture::new()
                .kv_str("general.architecture", "llama")
                .build(),
        );
        let projector = decode(
            GgufFixture::new()
                .kv_str("general.architecture", "clip")
                .build(),
        );
        let adapter = decode(GglaFixture::new(4, 8).build());
        let bare = decode(GgufFixture::new().build());

        assert_eq!(classify(&model, &config), MediaType::Model);
        assert_eq!(classify(&projector, &config), MediaType::Projector);
        assert_eq!(classify(&adapter, &config), MediaType::Adapter);
        assert_eq!(classify(&bare, &config), MediaType::Model);
    }

    #[test]
    fn test_projector_marker_is_configurable() {
        let config = ImportConfig {
            projector_architecture: "siglip".into(),
            ..ImportConfig::default()
        };
        let doc = decode(
            GgufFixture::new()
                .kv_str("general.architecture", "siglip")
                .build(),
        );
        assert_eq!(classify(&doc, &config), MediaType::Projector);
    }
}
