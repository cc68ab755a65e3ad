//! Rendezvous statistics reduction.
//!
//! Reduction is hierarchical: every thread's [`WorkerCounters`] are summed
//! into a process total, process totals are gathered and summed on the root,
//! and the root hands the sum to the source and event handler. Sums are
//! additive, so reducing nothing leaves every total unchanged.
//!
//! A failure at any level is wrapped with the name of the counter set that
//! failed and returned. Reduced counters are absorbed and the per-thread
//! counters cleared only once every step succeeded, so a failed rendezvous
//! leaves the collaborators' totals as they were.

use mcrun_core::{gather, Communicator, EventHandler, ParticleSource, ReductionError};
use mcrun_dispatch::WorkerArena;
use mcrun_types::{Rank, WorkerCounters};
use tracing::debug;

/// Result of one rendezvous reduction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReducedStatistics {
    /// This process's contribution.
    pub process: WorkerCounters,
    /// Sum over every rank; only known on the root.
    pub global: Option<WorkerCounters>,
}

/// Reduces worker counters at each rendezvous and keeps the running total.
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    root: Rank,
    reductions: u64,
    cumulative: WorkerCounters,
}

impl StatisticsAggregator {
    pub fn new(root: Rank) -> Self {
        Self {
            root,
            reductions: 0,
            cumulative: WorkerCounters::default(),
        }
    }

    /// Completed reductions.
    pub fn reductions(&self) -> u64 {
        self.reductions
    }

    /// Everything reduced so far by this aggregator (root only).
    pub fn cumulative(&self) -> &WorkerCounters {
        &self.cumulative
    }

    /// Reduce thread counters to the root and hand them to the collaborators.
    pub fn reduce<S, E>(
        &mut self,
        arena: &WorkerArena,
        source: &mut S,
        event_handler: &mut E,
        comm: &dyn Communicator,
    ) -> Result<ReducedStatistics, ReductionError>
    where
        S: ParticleSource,
        E: EventHandler,
    {
        let process = arena.fold();

        let global = gather(comm, &process, self.root)
            .map_err(|e| ReductionError::communication("worker counters", e))?
            .map(|per_rank| WorkerCounters::sum(&per_rank));

        source
            .reduce_data(comm, self.root)
            .map_err(|e| ReductionError::nested("source data", e))?;
        event_handler
            .reduce_data(comm, self.root)
            .map_err(|e| ReductionError::nested("event handler data", e))?;

        if let Some(global) = &global {
            source.absorb_counters(&global.sampling);
            event_handler.absorb_tally(&global.tally);
            self.cumulative.merge(global);
        }
        arena.clear();
        self.reductions += 1;
        debug!(
            reduction = self.reductions,
            histories = process.tally.histories,
            is_root = global.is_some(),
            "Reduced rendezvous statistics"
        );

        Ok(ReducedStatistics { process, global })
    }

    /// Forget the running total.
    pub fn reset(&mut self) {
        self.cumulative = WorkerCounters::default();
    }
}
