//! Progress snapshots published by workers inside a batch.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Histories completed in the current invocation.
///
/// Workers publish their local count `snapshots_per_batch` times per batch,
/// so status queries stay responsive without touching the shared counter on
/// every history.
#[derive(Debug)]
pub struct ProgressMonitor {
    completed: AtomicU64,
    snapshots_per_batch: AtomicU64,
}

impl ProgressMonitor {
    pub fn new(snapshots_per_batch: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            snapshots_per_batch: AtomicU64::new(snapshots_per_batch.max(1)),
        }
    }

    pub fn set_snapshots_per_batch(&self, snapshots: u64) {
        self.snapshots_per_batch
            .store(snapshots.max(1), Ordering::Relaxed);
    }

    /// Histories between two snapshots for a batch of `batch_len`.
    pub fn snapshot_interval(&self, batch_len: u64) -> u64 {
        (batch_len / self.snapshots_per_batch.load(Ordering::Relaxed)).max(1)
    }

    /// Publish `histories` newly completed histories.
    pub fn record(&self, histories: u64) {
        if histories > 0 {
            let total = self.completed.fetch_add(histories, Ordering::Relaxed) + histories;
            trace!(completed = total, "Progress snapshot");
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.completed.store(0, Ordering::Relaxed);
    }
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new(1)
    }
}
