//! Import orchestration.
//!
//! Resolves a source reference to bytes, classifies them, and drives the
//! matching pipeline:
//!
//! ```text
//! Resolving -> ParsingBinary -> Normalizing -> Materializing -> DetectingTemplate -> Done
//!           \-> Extracting (zip + conversion) ------^
//! ```
//!
//! Any error aborts the whole import; callers get every layer or none.

mod binary;
mod builder;
mod checkpoint;

use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

pub use builder::ImporterBuilder;

use crate::cache::ConversionCache;
use crate::cancel::CancellationToken;
use crate::config::ImportConfig;
use crate::convert::FormatConverter;
use crate::detect::{detect_content_type, sniff, ContentType};
use crate::digest::Digest;
use crate::error::{LayerError, Result};
use crate::ggml::decode_document;
use crate::ggml::source::SharedSource;
use crate::layer::{ImportedLayer, Layer, LayeredModel};
use crate::manifest::{Manifest, ManifestStore, RemotePuller};
use crate::materialize::LayerMaterializer;
use crate::progress::ProgressFn;
use crate::store::BlobStore;
use crate::template::{detect_chat_template, TemplateCatalog};

/// What to import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// A model name, resolved through the manifest store.
    Name(String),
    /// An uploaded blob already in the blob store.
    Blob(Digest),
    /// A file on local disk.
    File(PathBuf),
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Name(name) => write!(f, "{name}"),
            ImportSource::Blob(digest) => write!(f, "{digest}"),
            ImportSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Pipeline stages, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Resolving,
    ParsingBinary,
    Extracting,
    Normalizing,
    Materializing,
    DetectingTemplate,
    Done,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStage::Resolving => "resolving",
            ImportStage::ParsingBinary => "parsing_binary",
            ImportStage::Extracting => "extracting",
            ImportStage::Normalizing => "normalizing",
            ImportStage::Materializing => "materializing",
            ImportStage::DetectingTemplate => "detecting_template",
            ImportStage::Done => "done",
        };
        f.write_str(name)
    }
}

pub(crate) fn enter(stage: ImportStage, source: &str) {
    debug!(stage = %stage, source, "import stage");
}

/// Where raw bytes came from, for locating scratch space and the source digest.
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    Blob(Digest),
    File(PathBuf),
}

/// Normalizes model artifacts into content-addressed layers.
///
/// Cheap to clone; clones share collaborators and the conversion cache.
#[derive(Clone)]
pub struct Importer {
    inner: Arc<ImporterInner>,
}

pub(crate) struct ImporterInner {
    store: Arc<dyn BlobStore>,
    materializer: LayerMaterializer,
    manifests: Option<Arc<dyn ManifestStore>>,
    puller: Option<Arc<dyn RemotePuller>>,
    converter: Option<Arc<dyn FormatConverter>>,
    templates: Arc<dyn TemplateCatalog>,
    cache: Arc<ConversionCache>,
    config: ImportConfig,
}

/// Run blocking work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

impl Importer {
    /// Start configuring an importer that writes into `store`.
    pub fn builder(store: Arc<dyn BlobStore>) -> ImporterBuilder {
        ImporterBuilder::new(store)
    }

    pub fn config(&self) -> &ImportConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<ConversionCache> {
        &self.inner.cache
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.inner.store
    }

    /// Import `source` into layers.
    ///
    /// Template layers, if any, come after every model, projector and
    /// adapter layer.
    pub async fn import(
        &self,
        source: ImportSource,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<LayeredModel> {
        let label = source.to_string();
        enter(ImportStage::Resolving, &label);
        cancel.check()?;

        let layers = match source {
            ImportSource::Name(name) => self.import_name(&name, progress, &cancel).await?,
            ImportSource::Blob(digest) => {
                let store = self.inner.store.clone();
                let lookup = digest.clone();
                let src = blocking(move || store.open(&lookup)).await?;
                self.import_bytes(src, Origin::Blob(digest), &label, progress, &cancel)
                    .await?
            }
            ImportSource::File(path) => {
                let open_path = path.clone();
                let src = blocking(move || {
                    let file = File::open(&open_path)
                        .map_err(|e| LayerError::io_with_path(e, &open_path))?;
                    Ok(Arc::new(file) as SharedSource)
                })
                .await?;
                self.import_bytes(src, Origin::File(path), &label, progress, &cancel)
                    .await?
            }
        };

        enter(ImportStage::Done, &label);
        Ok(layers)
    }

    async fn lookup(&self, name: &str) -> Result<Manifest> {
        let manifests = self
            .inner
            .manifests
            .clone()
            .ok_or_else(|| LayerError::Other("no manifest store configured".into()))?;
        let name = name.to_string();
        blocking(move || manifests.lookup(&name)).await
    }

    /// Resolve a name to its manifest, pulling once on a local miss.
    async fn resolve(
        &self,
        name: &str,
        progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<Manifest> {
        match self.lookup(name).await {
            Ok(manifest) => Ok(manifest),
            Err(e) if e.is_not_found() => {
                let Some(puller) = self.inner.puller.clone() else {
                    return Err(e);
                };
                info!("Manifest for {} not found locally, pulling", name);
                tokio::select! {
                    result = puller.pull(name, &self.inner.config.pull, progress) => result?,
                    _ = cancel.cancelled() => return Err(LayerError::Cancelled),
                }
                self.lookup(name).await
            }
            Err(e) => Err(e),
        }
    }

    /// Re-wrap every layer of a stored manifest, decoding the model ones.
    async fn import_name(
        &self,
        name: &str,
        progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<LayeredModel> {
        let manifest = self.resolve(name, progress, cancel).await?;

        let inner = self.inner.clone();
        let name = name.to_string();
        let cancel = cancel.clone();
        blocking(move || {
            let mut layers = Vec::with_capacity(manifest.layers.len());
            for entry in manifest.layers {
                cancel.check()?;
                let status = format!("using existing layer {}", entry.digest);
                if entry.media_type.is_ggml() {
                    enter(ImportStage::ParsingBinary, &name);
                    let src = inner.store.open(&entry.digest)?;
                    let size = src.size()?;
                    let doc = decode_document(src.as_ref(), 0, &inner.config)?.ok_or_else(|| {
                        LayerError::format(0, format!("layer {} is empty", entry.digest))
                    })?;
                    let layer = Layer::new(entry.media_type, entry.digest, size)
                        .with_from(name.as_str())
                        .with_status(status);
                    layers.push(ImportedLayer::with_metadata(layer, doc));
                } else {
                    if !inner.store.contains(&entry.digest)? {
                        return Err(LayerError::BlobNotFound {
                            digest: entry.digest.to_string(),
                        });
                    }
                    let layer = Layer::new(entry.media_type, entry.digest, entry.size)
                        .with_from(name.as_str())
                        .with_status(status);
                    layers.push(ImportedLayer::new(layer));
                }
            }
            Ok(layers)
        })
        .await
    }

    /// Classify raw bytes and run the matching pipeline.
    async fn import_bytes(
        &self,
        src: SharedSource,
        origin: Origin,
        label: &str,
        progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<LayeredModel> {
        let sniff_src = src.clone();
        let sniff_len = self.inner.config.sniff_len;
        let prefix = blocking(move || Ok(sniff(sniff_src.as_ref(), sniff_len)?)).await?;
        let content_type = detect_content_type(&prefix);
        debug!("Detected content type {} for {}", content_type, label);

        let layers = match content_type {
            ContentType::Gguf | ContentType::Ggla => {
                self.parse_binary(src, label, progress.clone(), cancel)
                    .await?
            }
            ContentType::Zip => {
                vec![self.parse_zip(src, origin, label, progress.clone(), cancel).await?]
            }
            other => {
                return Err(LayerError::UnsupportedContentType {
                    content_type: other.to_string(),
                })
            }
        };

        self.detect_templates(layers, label, progress, cancel).await
    }

    async fn detect_templates(
        &self,
        mut layers: LayeredModel,
        label: &str,
        progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<LayeredModel> {
        enter(ImportStage::DetectingTemplate, label);
        let inner = self.inner.clone();
        let cancel = cancel.clone();
        blocking(move || {
            let before = layers.len();
            detect_chat_template(
                &mut layers,
                inner.templates.as_ref(),
                &inner.materializer,
                &cancel,
            )?;
            for added in &layers[before..] {
                if let Some(status) = &added.layer.status {
                    crate::progress::report(&progress, status.clone());
                }
            }
            Ok(layers)
        })
        .await
    }
}
