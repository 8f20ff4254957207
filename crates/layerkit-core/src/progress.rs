//! Coarse-grained progress events emitted during an import.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A single progress milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: String,
}

impl ProgressEvent {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Callback that receives progress events. Purely observational.
pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// A progress callback that discards every event.
pub fn noop_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// A progress callback that forwards events into an unbounded channel.
///
/// Send errors are ignored; a dropped receiver just stops observing.
pub fn progress_channel() -> (ProgressFn, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ProgressFn = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (callback, rx)
}

pub(crate) fn report(progress: &ProgressFn, status: impl Into<String>) {
    progress(ProgressEvent::new(status));
}
