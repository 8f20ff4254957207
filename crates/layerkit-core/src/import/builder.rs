//! Builder for configuring an Importer.

use std::sync::Arc;

use super::{Importer, ImporterInner};
use crate::cache::ConversionCache;
use crate::config::ImportConfig;
use crate::convert::FormatConverter;
use crate::manifest::{ManifestStore, RemotePuller};
use crate::materialize::LayerMaterializer;
use crate::store::BlobStore;
use crate::template::{StaticTemplateCatalog, TemplateCatalog};

/// Builder for configuring an [`Importer`].
///
/// Only the blob store is required. Without a manifest store, name imports
/// fail; without a converter, zip imports fail; without a catalog, no
/// template layers are ever added.
///
/// # Example
///
/// ```rust,ignore
/// use layerkit::{FsBlobStore, Importer, ImportSource};
///
/// let importer = Importer::builder(Arc::new(FsBlobStore::new("./blobs")?))
///     .with_manifest_store(Arc::new(DirManifestStore::new("./manifests")))
///     .with_templates(Arc::new(catalog))
///     .build();
/// let layers = importer
///     .import(ImportSource::File("model.gguf".into()), noop_progress(), CancellationToken::new())
///     .await?;
/// ```
pub struct ImporterBuilder {
    store: Arc<dyn BlobStore>,
    manifests: Option<Arc<dyn ManifestStore>>,
    puller: Option<Arc<dyn RemotePuller>>,
    converter: Option<Arc<dyn FormatConverter>>,
    templates: Option<Arc<dyn TemplateCatalog>>,
    cache: Option<Arc<ConversionCache>>,
    config: ImportConfig,
}

impl ImporterBuilder {
    /// Create a new builder that writes layers into `store`.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            manifests: None,
            puller: None,
            converter: None,
            templates: None,
            cache: None,
            config: ImportConfig::default(),
        }
    }

    /// Local manifest lookup for name imports.
    pub fn with_manifest_store(mut self, manifests: Arc<dyn ManifestStore>) -> Self {
        self.manifests = Some(manifests);
        self
    }

    /// Registry client used once when a name is not found locally.
    pub fn with_puller(mut self, puller: Arc<dyn RemotePuller>) -> Self {
        self.puller = Some(puller);
        self
    }

    /// Checkpoint converter for zip imports.
    pub fn with_converter(mut self, converter: Arc<dyn FormatConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Catalog consulted for embedded chat templates.
    pub fn with_templates(mut self, templates: Arc<dyn TemplateCatalog>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Share a conversion cache between importers.
    ///
    /// Default: a fresh cache owned by this importer and its clones.
    pub fn with_cache(mut self, cache: Arc<ConversionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Importer instance.
    pub fn build(self) -> Importer {
        let materializer =
            LayerMaterializer::new(self.store.clone()).with_chunk_size(self.config.copy_chunk_size);
        Importer {
            inner: Arc::new(ImporterInner {
                store: self.store,
                materializer,
                manifests: self.manifests,
                puller: self.puller,
                converter: self.converter,
                templates: self
                    .templates
                    .unwrap_or_else(|| Arc::new(StaticTemplateCatalog::new())),
                cache: self.cache.unwrap_or_default(),
                config: self.config,
            }),
        }
    }
}
