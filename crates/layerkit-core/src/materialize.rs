//! Turning byte streams into content-addressed layers.

use std::io::{BufReader, Read};
use std::sync::Arc;

use tracing::debug;

use crate::cancel::{CancelAwareReader, CancellationToken};
use crate::config::ImportConfig;
use crate::digest::HashingReader;
use crate::error::{LayerError, Result};
use crate::layer::{Layer, MediaType};
use crate::store::BlobStore;

/// Writes streams into a blob store and describes the result as a [`Layer`].
#[derive(Clone)]
pub struct LayerMaterializer {
    store: Arc<dyn BlobStore>,
    chunk_size: usize,
}

impl LayerMaterializer {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            chunk_size: ImportConfig::DEFAULT_COPY_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Read `source` once, store it, and return its layer.
    ///
    /// The digest is computed here as well as by the store; if the two
    /// disagree the store did not keep what it was given and the import fails.
    pub fn materialize(
        &self,
        source: &mut dyn Read,
        media_type: MediaType,
        cancel: &CancellationToken,
    ) -> Result<Layer> {
        cancel.check()?;
        let guarded = CancelAwareReader::new(source, cancel.clone());
        let mut hashing = HashingReader::new(BufReader::with_capacity(self.chunk_size, guarded));
        let written = self.store.write(&mut hashing)?;
        let (digest, size) = hashing.finish();

        if digest != written.digest || size != written.size {
            return Err(LayerError::DigestMismatch {
                expected: digest.to_string(),
                actual: written.digest.to_string(),
            });
        }

        let status = if written.created {
            format!("creating new layer {}", digest)
        } else {
            format!("using existing layer {}", digest)
        };
        debug!("{} ({}, {} bytes)", status, media_type, size);

        Ok(Layer::new(media_type, digest, size).with_status(status))
    }
}
