//! Sources of history batches.

use mcrun_core::{CancellationToken, CommError};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Hands out contiguous ranges of history numbers to worker threads.
///
/// Every range returned must be run to completion, so the completed
/// histories always form a contiguous prefix of what was issued.
pub trait BatchQueue: Sync {
    /// Claim the next batch, or `None` when the rendezvous is exhausted or
    /// a stop was requested.
    fn next_batch(&self) -> Result<Option<Range<u64>>, CommError>;
}

/// Why a queue stopped issuing batches early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    WallTime,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::WallTime => f.write_str("wall time exhausted"),
        }
    }
}

/// Conditions checked between batches.
#[derive(Debug, Clone, Default)]
pub struct StopCondition {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl StopCondition {
    /// Never stops early.
    pub fn never() -> Self {
        Self::default()
    }

    /// Stop when `token` is cancelled.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Stop once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn should_stop(&self) -> Option<StopReason> {
        if self.token.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Some(StopReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(StopReason::WallTime);
        }
        None
    }
}

/// In-process queue over `[start, end)`, claimed through an atomic cursor.
#[derive(Debug)]
pub struct LocalBatchQueue {
    cursor: AtomicU64,
    end: u64,
    batch_size: u64,
    stop: StopCondition,
    stopped: Mutex<Option<StopReason>>,
}

impl LocalBatchQueue {
    pub fn new(range: Range<u64>, batch_size: u64, stop: StopCondition) -> Self {
        Self {
            cursor: AtomicU64::new(range.start),
            end: range.end.max(range.start),
            batch_size: batch_size.max(1),
            stop,
            stopped: Mutex::new(None),
        }
    }

    /// One past the last history issued so far.
    pub fn issued_end(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Whether the queue stopped before its range was exhausted.
    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.stopped.lock()
    }
}

impl BatchQueue for LocalBatchQueue {
    fn next_batch(&self) -> Result<Option<Range<u64>>, CommError> {
        if let Some(reason) = self.stop.should_stop() {
            if self.issued_end() < self.end {
                self.stopped.lock().get_or_insert(reason);
            }
            return Ok(None);
        }

        let claimed = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < self.end).then(|| current.saturating_add(self.batch_size).min(self.end))
            });

        Ok(claimed
            .ok()
            .map(|start| start..start.saturating_add(self.batch_size).min(self.end)))
    }
}
