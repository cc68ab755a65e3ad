//! Collaborator traits.
//!
//! The engine schedules histories; what happens inside a history belongs to
//! three collaborators:
//!
//! ```text
//!   ParticleSource ──sample──▶ SourceParticle[] ──locate──▶ GeometryModel
//!                                    │
//!                                    └──commit──▶ EventHandler
//! ```
//!
//! Collaborators are shared immutably by every worker thread during a
//! rendezvous. Per-thread results go into the [`WorkerContext`] counters and
//! are handed back to the collaborators, already reduced, at the rendezvous.
//!
//! Collaborators are persisted in every archive, hence the serde bounds.

use crate::{Communicator, ReductionError, SourceParticle, WorkerContext};
use mcrun_types::{CellId, HistoryTally, PhaseSpaceDimension, Rank, SamplingCounters};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{self, Write};

/// Data that takes part in the rendezvous reduction.
pub trait Reducible {
    /// Reduce collaborator-held data onto `root`.
    ///
    /// Called on every rank once the engine counters have been reduced. The
    /// default has nothing to reduce.
    fn reduce_data(&mut self, _comm: &dyn Communicator, _root: Rank) -> Result<(), ReductionError> {
        Ok(())
    }

    /// Discard accumulated data.
    fn reset_data(&mut self);
}

/// Geometry of the problem.
pub trait GeometryModel: Send + Sync + Serialize + DeserializeOwned {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Whether `cell` exists in the geometry.
    fn contains_cell(&self, cell: CellId) -> bool;

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()> {
        writeln!(os, "Geometry: {}", self.name())
    }
}

/// Emits the initial particle states of each history.
pub trait ParticleSource: Reducible + Send + Sync + Serialize + DeserializeOwned {
    /// Sample the particles of `history`, recording trials and samples in
    /// the worker counters.
    fn sample_particle_states(&self, history: u64, ctx: &mut WorkerContext) -> Vec<SourceParticle>;

    /// Cells in which source particles can start.
    fn starting_cells(&self) -> BTreeSet<CellId>;

    /// Reduced sampling counters held by this source.
    fn counters(&self) -> &SamplingCounters;

    /// Add reduced counters from a rendezvous.
    fn absorb_counters(&mut self, reduced: &SamplingCounters);

    fn number_of_trials(&self) -> u64 {
        self.counters().trials
    }

    fn number_of_samples(&self) -> u64 {
        self.counters().samples
    }

    fn number_of_dimension_trials(&self, dimension: PhaseSpaceDimension) -> u64 {
        self.counters().dimension_trials.get(dimension)
    }

    fn number_of_dimension_samples(&self, dimension: PhaseSpaceDimension) -> u64 {
        self.counters().dimension_samples.get(dimension)
    }

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()>;

    fn log_summary(&self);
}

/// Records what happened in each history.
pub trait EventHandler: Reducible + Send + Sync + Serialize + DeserializeOwned {
    /// Commit the contribution of a finished history.
    fn commit_history(&self, history: u64, particles: &[SourceParticle], ctx: &mut WorkerContext);

    /// Count a source particle that started outside the geometry.
    fn record_lost_particle(&self, particle: &SourceParticle, ctx: &mut WorkerContext) {
        let _ = particle;
        ctx.counters.tally.lost_particles += 1;
    }

    /// Reduced tally held by this handler.
    fn tally(&self) -> &HistoryTally;

    /// Add a reduced tally from a rendezvous.
    fn absorb_tally(&mut self, reduced: &HistoryTally);

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()>;

    fn log_summary(&self);
}

/// Body of a single history.
pub trait HistoryPipeline: Sync {
    fn simulate_history(&self, history: u64, ctx: &mut WorkerContext);
}

/// Source → geometry → event handler pipeline over borrowed collaborators.
pub struct CollaboratorPipeline<'a, M, S, E> {
    pub model: &'a M,
    pub source: &'a S,
    pub event_handler: &'a E,
}

impl<M, S, E> HistoryPipeline for CollaboratorPipeline<'_, M, S, E>
where
    M: GeometryModel,
    S: ParticleSource,
    E: EventHandler,
{
    fn simulate_history(&self, history: u64, ctx: &mut WorkerContext) {
        ctx.begin_history(history);
        let mut particles = self.source.sample_particle_states(history, ctx);

        particles.retain(|particle| {
            let located = self.model.contains_cell(particle.cell);
            if !located {
                self.event_handler.record_lost_particle(particle, ctx);
            }
            located
        });

        self.event_handler.commit_history(history, &particles, ctx);
    }
}
