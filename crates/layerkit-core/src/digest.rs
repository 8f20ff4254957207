//! Content digests for layers and blobs.
//!
//! Provides:
//! - A validated `sha256:<hex>` digest type
//! - A hashing reader that digests bytes as they stream past
//! - Single-pass file digesting for uploaded sources

use crate::cancel::{CancelAwareReader, CancellationToken};
use crate::error::{LayerError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Chunk size for reading files (8MB, optimal for SSDs).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// A SHA256 content digest in `sha256:<64 lowercase hex>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    pub const ALGORITHM: &'static str = "sha256";

    /// Parse a digest from `sha256:<hex>` or the file-name form `sha256-<hex>`.
    pub fn parse(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix("sha256:")
            .or_else(|| s.strip_prefix("sha256-"))
            .ok_or_else(|| LayerError::InvalidDigest(s.to_string()))?;

        if hex_part.len() != 64 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LayerError::InvalidDigest(s.to_string()));
        }

        Ok(Self(format!("sha256:{}", hex_part.to_ascii_lowercase())))
    }

    /// Digest of an in-memory buffer.
    pub fn of_bytes(data: impl AsRef<[u8]>) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(data.as_ref()))
    }

    fn from_hasher(hasher: Sha256) -> Self {
        Self(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    /// The lowercase hex portion.
    pub fn hex(&self) -> &str {
        &self.0["sha256:".len()..]
    }

    /// File-name form used by content-addressed stores (`sha256-<hex>`).
    pub fn file_name(&self) -> String {
        format!("sha256-{}", self.hex())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl std::str::FromStr for Digest {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

/// Reader adapter that hashes and counts every byte read through it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes_read: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the reader, returning the digest and byte count of what was read.
    pub fn finish(self) -> (Digest, u64) {
        (Digest::from_hasher(self.hasher), self.bytes_read)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Compute the digest of a file in a single streaming pass.
///
/// Returns the digest and the number of bytes hashed.
pub fn digest_file(path: impl AsRef<Path>, cancel: &CancellationToken) -> Result<(Digest, u64)> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| LayerError::io_with_path(e, path))?;
    let mut reader = HashingReader::new(CancelAwareReader::new(file, cancel.clone()));

    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| LayerError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
    }

    Ok(reader.finish())
}
