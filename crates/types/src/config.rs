//! Run configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A wall-time budget in seconds that is negative, NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Invalid wall-time budget: {0} s")]
pub struct InvalidWallTime(pub f64);

/// User-facing run parameters.
///
/// Zero-valued limits mean "unbounded"; the builder methods normalise them to
/// `None` so the rest of the workspace only has to handle one representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    /// Histories to run in this invocation (0 = unbounded).
    pub history_target: u64,

    /// Minimum number of rendezvous the history target is split into.
    pub min_rendezvous: u64,

    /// Upper bound on histories between two rendezvous.
    pub max_rendezvous_batch_size: Option<u64>,

    /// Batches each worker runs per rendezvous.
    ///
    /// Older run files call this `min_number_of_batches_per_rendezvous` or
    /// `number_of_batches_per_processor`.
    #[serde(
        alias = "min_number_of_batches_per_rendezvous",
        alias = "number_of_batches_per_processor"
    )]
    pub batch_multiplier: u64,

    /// Upper bound on histories per batch.
    pub max_batch_size: Option<u64>,

    /// Wall-time budget for one invocation.
    pub wall_time_budget: Option<Duration>,

    /// How many progress snapshots a worker publishes per batch.
    pub snapshots_per_batch: u64,
}

impl RunConfiguration {
    /// Create a configuration that runs `history_target` histories.
    pub fn new(history_target: u64) -> Self {
        Self {
            history_target,
            ..Default::default()
        }
    }

    /// Set the history target (0 = unbounded).
    pub fn with_history_target(mut self, histories: u64) -> Self {
        self.history_target = histories;
        self
    }

    /// Set the minimum number of rendezvous.
    pub fn with_min_rendezvous(mut self, rendezvous: u64) -> Self {
        self.min_rendezvous = rendezvous;
        self
    }

    /// Cap the rendezvous batch size (0 = unbounded).
    pub fn with_max_rendezvous_batch_size(mut self, histories: u64) -> Self {
        self.max_rendezvous_batch_size = non_zero(histories);
        self
    }

    /// Set the number of batches per worker per rendezvous.
    pub fn with_batch_multiplier(mut self, batches: u64) -> Self {
        self.batch_multiplier = batches;
        self
    }

    /// Alias of [`Self::with_batch_multiplier`] used by single-process runs.
    pub fn with_min_batches_per_rendezvous(self, batches: u64) -> Self {
        self.with_batch_multiplier(batches)
    }

    /// Alias of [`Self::with_batch_multiplier`] used by distributed runs.
    pub fn with_batches_per_processor(self, batches: u64) -> Self {
        self.with_batch_multiplier(batches)
    }

    /// Cap the batch size (0 = unbounded).
    pub fn with_max_batch_size(mut self, histories: u64) -> Self {
        self.max_batch_size = non_zero(histories);
        self
    }

    /// Set the wall-time budget (zero = unbounded).
    pub fn with_wall_time(mut self, budget: Duration) -> Self {
        self.wall_time_budget = (!budget.is_zero()).then_some(budget);
        self
    }

    /// Set the wall-time budget in seconds (0 = unbounded).
    pub fn with_wall_time_secs(self, seconds: f64) -> Result<Self, InvalidWallTime> {
        let budget = Duration::try_from_secs_f64(seconds).map_err(|_| InvalidWallTime(seconds))?;
        Ok(self.with_wall_time(budget))
    }

    /// Set the number of progress snapshots per batch.
    pub fn with_snapshots_per_batch(mut self, snapshots: u64) -> Self {
        self.snapshots_per_batch = snapshots;
        self
    }

    /// Whether the run stops after a fixed number of histories.
    pub fn is_history_bounded(&self) -> bool {
        self.history_target > 0
    }

    /// Whether the run stops after a wall-time budget.
    pub fn is_wall_time_bounded(&self) -> bool {
        self.wall_time_budget.is_some()
    }

    /// Rewrite zero-valued optional limits as `None`.
    ///
    /// Deserialized configurations may carry explicit zeros.
    pub fn normalized(mut self) -> Self {
        self.max_rendezvous_batch_size = self.max_rendezvous_batch_size.and_then(non_zero);
        self.max_batch_size = self.max_batch_size.and_then(non_zero);
        self.wall_time_budget = self.wall_time_budget.filter(|d| !d.is_zero());
        self
    }
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            history_target: 0,
            min_rendezvous: 1,
            max_rendezvous_batch_size: None,
            batch_multiplier: 1,
            max_batch_size: None,
            wall_time_budget: None,
            snapshots_per_batch: 1,
        }
    }
}

fn non_zero(value: u64) -> Option<u64> {
    (value > 0).then_some(value)
}
