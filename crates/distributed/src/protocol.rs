//! Messages exchanged between the coordinator and worker ranks.
//!
//! Per rendezvous:
//!
//! ```text
//!   root                                   worker rank
//!    │── Order::Rendezvous ───────────────────▶│
//!    │◀──────────────────────── WorkRequest ───│  (one per claimed batch)
//!    │── WorkReply::Batch / Exhausted ────────▶│
//!    │◀─────────────────────── RankFinished ───│
//!    │◀──────────────── Gather(counters) ──────│
//!    │── Verdict::Committed / Aborted ────────▶│  (after the archive write)
//! ```
//!
//! After the last rendezvous the root sends `Order::Terminate`. If the root
//! fails while serving or between rendezvous it sends `Order::Abort` instead.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One rendezvous worth of histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendezvousOrder {
    /// Index of the rendezvous being run.
    pub rendezvous: u64,
    pub start: u64,
    pub end: u64,
    pub batch_size: u64,
}

impl RendezvousOrder {
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// What the root asks workers to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorOrder {
    Rendezvous(RendezvousOrder),
    Terminate,
    Abort(String),
}

/// How the root closed a rendezvous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RendezvousVerdict {
    /// Statistics reduced and the archive written.
    Committed,
    /// The root failed to reduce or persist; the run is over.
    Aborted(String),
}

/// Answer to a work request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkReply {
    Batch { start: u64, end: u64 },
    Exhausted,
}

/// What a worker rank ran during one rendezvous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankReport {
    pub batches: u64,
    pub histories: u64,
}
