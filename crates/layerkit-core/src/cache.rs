//! Process-lifetime memoization of checkpoint conversions.
//!
//! Maps the digest of an uploaded source to the digest of the model layer it
//! converted into. Each source digest owns a once-cell, so concurrent imports
//! of the same source share one conversion: the first caller runs it and the
//! rest wait for its result. A failed conversion leaves the cell empty and
//! the next caller tries again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::info;

use crate::digest::Digest;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct ConversionCache {
    entries: Mutex<HashMap<Digest, Arc<OnceCell<Digest>>>>,
}

impl ConversionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, source: &Digest) -> Arc<OnceCell<Digest>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source.clone())
            .or_default()
            .clone()
    }

    /// Converted layer digest for `source`, if a conversion has completed.
    pub fn get(&self, source: &Digest) -> Option<Digest> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .and_then(|cell| cell.get().cloned())
    }

    /// Record a completed conversion. An existing entry is kept.
    pub fn put(&self, source: Digest, layer: Digest) {
        let cell = self.cell(&source);
        if cell.set(layer).is_err() {
            tracing::debug!("Conversion of {} already cached", source);
        }
    }

    /// Number of completed conversions.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached layer digest for `source`, running `convert` only if
    /// no conversion has completed and none is in flight.
    ///
    /// The flag is true when the digest came from the cache.
    pub async fn get_or_convert<F, Fut>(&self, source: &Digest, convert: F) -> Result<(Digest, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Digest>>,
    {
        let cell = self.cell(source);
        let mut ran = false;
        let layer = cell
            .get_or_try_init(|| {
                ran = true;
                convert()
            })
            .await?
            .clone();

        if !ran {
            info!("Using cached conversion of {} as {}", source, layer);
        }
        Ok((layer, !ran))
    }
}
