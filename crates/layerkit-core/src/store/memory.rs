//! In-memory blob store.

use bytes::Bytes;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::traits::{BlobStore, BlobWrite};
use crate::digest::Digest;
use crate::error::{LayerError, Result};
use crate::ggml::source::SharedSource;

/// Keeps blobs in a map. Counts physical writes so tests can assert dedup.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<Digest, Bytes>>,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that actually stored new content.
    pub fn physical_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of a stored blob's bytes.
    pub fn get(&self, digest: &Digest) -> Option<Bytes> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(digest)
            .cloned()
    }

    /// Store `data` directly, for seeding fixtures.
    pub fn insert(&self, data: impl Into<Bytes>) -> Result<BlobWrite> {
        let data: Bytes = data.into();
        self.store(Digest::of_bytes(&data), data)
    }

    fn store(&self, digest: Digest, data: Bytes) -> Result<BlobWrite> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        let size = data.len() as u64;
        if let Some(existing) = blobs.get(&digest) {
            if *existing != data {
                return Err(LayerError::DigestCollision {
                    digest: digest.to_string(),
                });
            }
            return Ok(BlobWrite {
                digest,
                size,
                created: false,
            });
        }
        blobs.insert(digest.clone(), data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(BlobWrite {
            digest,
            size,
            created: true,
        })
    }
}

impl BlobStore for MemoryBlobStore {
    fn open(&self, digest: &Digest) -> Result<SharedSource> {
        self.get(digest)
            .map(|data| Arc::new(data) as SharedSource)
            .ok_or_else(|| LayerError::BlobNotFound {
                digest: digest.to_string(),
            })
    }

    fn contains(&self, digest: &Digest) -> Result<bool> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(digest))
    }

    fn write(&self, reader: &mut dyn Read) -> Result<BlobWrite> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let data = Bytes::from(data);
        self.store(Digest::of_bytes(&data), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_by_digest() {
        let store = MemoryBlobStore::new();
        let a = store.write(&mut &b"abc"[..]).unwrap();
        let b = store.write(&mut &b"abc"[..]).unwrap();
        assert_eq!(a.digest, b.digest);
        assert!(a.created && !b.created);
        assert_eq!(store.physical_writes(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_open_missing() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.open(&Digest::of_bytes(b"x")),
            Err(LayerError::BlobNotFound { .. })
        ));
    }
}
