//! Filesystem blob store.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::traits::{BlobStore, BlobWrite};
use crate::digest::{Digest, HashingReader};
use crate::error::{LayerError, Result};
use crate::ggml::source::SharedSource;

/// Stores blobs as `<root>/sha256-<hex>`.
///
/// Writes stream into a temp file in `root` while hashing, then rename into
/// place, so a blob path only ever holds complete content.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    const TEMP_PREFIX: &'static str = ".tmp_blob_";

    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| LayerError::io_with_path(e, &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a blob with this digest lives at.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.file_name())
    }
}

impl BlobStore for FsBlobStore {
    fn open(&self, digest: &Digest) -> Result<SharedSource> {
        let path = self.blob_path(digest);
        match File::open(&path) {
            Ok(file) => Ok(Arc::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LayerError::BlobNotFound {
                digest: digest.to_string(),
            }),
            Err(e) => Err(LayerError::io_with_path(e, path)),
        }
    }

    fn contains(&self, digest: &Digest) -> Result<bool> {
        Ok(self.blob_path(digest).is_file())
    }

    fn write(&self, reader: &mut dyn Read) -> Result<BlobWrite> {
        let mut temp = tempfile::Builder::new()
            .prefix(Self::TEMP_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| LayerError::io_with_path(e, &self.root))?;

        let mut hashing = HashingReader::new(reader);
        io::copy(&mut hashing, temp.as_file_mut())
            .map_err(|e| LayerError::io_with_path(e, temp.path()))?;
        let (digest, size) = hashing.finish();

        let path = self.blob_path(&digest);
        if let Ok(existing) = fs::metadata(&path) {
            if existing.len() != size {
                return Err(LayerError::DigestCollision {
                    digest: digest.to_string(),
                });
            }
            debug!("Blob {} already stored", digest);
            return Ok(BlobWrite {
                digest,
                size,
                created: false,
            });
        }

        temp.as_file()
            .sync_all()
            .map_err(|e| LayerError::io_with_path(e, temp.path()))?;
        temp.persist(&path)
            .map_err(|e| LayerError::io_with_path(e.error, &path))?;
        debug!("Stored blob {} ({} bytes)", digest, size);

        Ok(BlobWrite {
            digest,
            size,
            created: true,
        })
    }
}
