//! Batch planning.
//!
//! Turns a [`RunConfiguration`] and a worker count into a [`BatchPlan`]:
//!
//! ```text
//! rendezvous = max_rendezvous_batch_size                      if history_target == 0
//!            = min(history_target / max(1, min_rendezvous),
//!                  max_rendezvous_batch_size)                  otherwise
//! batch      = min(rendezvous / (workers * max(1, multiplier)), max_batch_size)
//! ```
//!
//! Absent caps are `+inf` ([`BatchPlan::UNBOUNDED`]). The computation is pure
//! and total; [`validate`] rejects plans that cannot make progress.

use mcrun_types::{BatchPlan, RunConfiguration};
use thiserror::Error;
use tracing::debug;

/// Plans that cannot make progress.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Rendezvous batch size is 0: history target {history_target} is smaller than min rendezvous {min_rendezvous}")]
    EmptyRendezvous {
        history_target: u64,
        min_rendezvous: u64,
    },

    #[error("Batch size is 0: rendezvous batch size {rendezvous_batch_size} cannot feed {workers} worker(s) x {multiplier} batch(es)")]
    EmptyBatch {
        rendezvous_batch_size: u64,
        workers: u64,
        multiplier: u64,
    },
}

/// Compute the plan for `worker_count` history-running workers.
///
/// A worker count of 0 is treated as 1.
pub fn compute_plan(config: &RunConfiguration, worker_count: u64) -> BatchPlan {
    let max_rendezvous = config
        .max_rendezvous_batch_size
        .unwrap_or(BatchPlan::UNBOUNDED);

    let rendezvous_batch_size = if config.history_target == 0 {
        max_rendezvous
    } else {
        (config.history_target / config.min_rendezvous.max(1)).min(max_rendezvous)
    };

    let divisor = worker_count
        .max(1)
        .saturating_mul(config.batch_multiplier.max(1));
    let batch_size = (rendezvous_batch_size / divisor)
        .min(config.max_batch_size.unwrap_or(BatchPlan::UNBOUNDED));

    BatchPlan {
        rendezvous_batch_size,
        batch_size,
    }
}

/// Check that a plan computed from `config` can make progress.
pub fn validate(
    plan: &BatchPlan,
    config: &RunConfiguration,
    worker_count: u64,
) -> Result<(), PlanError> {
    if plan.rendezvous_batch_size == 0 {
        return Err(PlanError::EmptyRendezvous {
            history_target: config.history_target,
            min_rendezvous: config.min_rendezvous,
        });
    }
    if plan.batch_size == 0 {
        return Err(PlanError::EmptyBatch {
            rendezvous_batch_size: plan.rendezvous_batch_size,
            workers: worker_count.max(1),
            multiplier: config.batch_multiplier.max(1),
        });
    }
    Ok(())
}

/// Compute and validate in one step.
pub fn plan_checked(config: &RunConfiguration, worker_count: u64) -> Result<BatchPlan, PlanError> {
    let plan = compute_plan(config, worker_count);
    validate(&plan, config, worker_count)?;
    debug!(%plan, worker_count, "Computed batch plan");
    Ok(plan)
}
