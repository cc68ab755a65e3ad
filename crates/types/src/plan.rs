//! Derived scheduling plan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Histories per rendezvous and per batch, derived from a [`RunConfiguration`].
///
/// [`RunConfiguration`]: crate::RunConfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Histories executed between two rendezvous, across all workers.
    pub rendezvous_batch_size: u64,
    /// Histories a single worker claims per inner iteration.
    pub batch_size: u64,
}

impl BatchPlan {
    /// Sentinel for an unbounded size.
    pub const UNBOUNDED: u64 = u64::MAX;

    /// Whether rendezvous only happen on wall time or cancellation.
    pub fn is_rendezvous_unbounded(&self) -> bool {
        self.rendezvous_batch_size == Self::UNBOUNDED
    }
}

impl fmt::Display for BatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: u64| {
            if v == Self::UNBOUNDED {
                "unbounded".to_string()
            } else {
                v.to_string()
            }
        };
        write!(
            f,
            "BatchPlan(rendezvous={}, batch={})",
            show(self.rendezvous_batch_size),
            show(self.batch_size)
        )
    }
}
