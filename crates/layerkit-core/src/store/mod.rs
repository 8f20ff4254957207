//! Content-addressed blob storage.
//!
//! Provides the storage seam the importer writes layers through:
//! - Filesystem store laid out as `sha256-<hex>` files under one root
//! - In-memory store for tests and embedding

mod fs;
mod memory;
mod traits;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use traits::{BlobStore, BlobWrite};
