//! Blob store trait and types.

use std::io::Read;

use crate::digest::Digest;
use crate::error::Result;
use crate::ggml::source::SharedSource;

/// Outcome of a content-addressed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobWrite {
    pub digest: Digest,
    pub size: u64,
    /// False when a blob with this digest was already stored.
    pub created: bool,
}

/// Generic blob store trait.
///
/// All operations are synchronous; the importer drives them from blocking
/// tasks.
pub trait BlobStore: Send + Sync {
    /// Open a stored blob for positional reads.
    ///
    /// Returns `BlobNotFound` if no blob has this digest.
    fn open(&self, digest: &Digest) -> Result<SharedSource>;

    /// Check whether a blob with this digest is stored.
    fn contains(&self, digest: &Digest) -> Result<bool>;

    /// Store everything `reader` yields, keyed by its digest.
    ///
    /// Writing content that is already stored is a no-op that still reports
    /// the digest. A stored blob with the same digest but different content
    /// fails with `DigestCollision`.
    fn write(&self, reader: &mut dyn Read) -> Result<BlobWrite>;
}
