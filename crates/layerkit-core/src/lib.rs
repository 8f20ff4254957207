//! Layerkit - Model artifact import core.
//!
//! Turns a model artifact into an ordered list of immutable, content-addressed
//! layers tagged with a media type (model, projector, adapter, template).
//! Sources can be a stored manifest name, a raw GGUF/GGLA stream, or a
//! zip-packaged checkpoint that an external converter turns into GGUF.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use layerkit::{noop_progress, CancellationToken, FsBlobStore, ImportSource, Importer};
//!
//! #[tokio::main]
//! async fn main() -> layerkit::Result<()> {
//!     let store = Arc::new(FsBlobStore::new("/var/lib/models/blobs")?);
//!     let importer = Importer::builder(store).build();
//!
//!     let layers = importer
//!         .import(
//!             ImportSource::File("llama-3-8b.Q4_K_M.gguf".into()),
//!             noop_progress(),
//!             CancellationToken::new(),
//!         )
//!         .await?;
//!     for imported in &layers {
//!         println!("{} {}", imported.layer.media_type, imported.layer.digest);
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod convert;
pub mod detect;
pub mod digest;
pub mod error;
pub mod ggml;
pub mod layer;
pub mod manifest;
pub mod materialize;
pub mod normalize;
pub mod progress;
pub mod store;
pub mod template;

mod import;

// Re-export commonly used types
pub use cache::ConversionCache;
pub use cancel::{CancellationToken, CancelledError};
pub use config::ImportConfig;
pub use convert::{ConversionParams, FormatConverter, ModelArchitecture};
pub use detect::{detect_content_type, ContentType};
pub use digest::Digest;
pub use error::{LayerError, Result};
pub use ggml::{GgmlDocument, TensorDescriptor, TensorKind};
pub use import::{ImportSource, ImportStage, Importer, ImporterBuilder};
pub use layer::{ImportedLayer, Layer, LayeredModel, MediaType};
pub use manifest::{
    DirManifestStore, Manifest, ManifestLayer, ManifestStore, PullOptions, RemotePuller,
};
pub use materialize::LayerMaterializer;
pub use progress::{noop_progress, progress_channel, ProgressEvent, ProgressFn};
pub use store::{BlobStore, BlobWrite, FsBlobStore, MemoryBlobStore};
pub use template::{NamedTemplate, StaticTemplateCatalog, TemplateCatalog};
