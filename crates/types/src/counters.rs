//! Fixed-size statistics counters.
//!
//! Every worker thread owns one [`WorkerCounters`]. At each rendezvous the
//! per-thread values are summed into a process total, and the process totals
//! are summed on the root. All merges are plain additions, so reducing an
//! empty set of counters leaves a total unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase-space dimension sampled by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseSpaceDimension {
    Position,
    Direction,
    Energy,
    Time,
    Weight,
}

impl PhaseSpaceDimension {
    /// Number of dimensions.
    pub const COUNT: usize = 5;

    /// All dimensions in counter order.
    pub const ALL: [PhaseSpaceDimension; Self::COUNT] = [
        PhaseSpaceDimension::Position,
        PhaseSpaceDimension::Direction,
        PhaseSpaceDimension::Energy,
        PhaseSpaceDimension::Time,
        PhaseSpaceDimension::Weight,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PhaseSpaceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseSpaceDimension::Position => "position",
            PhaseSpaceDimension::Direction => "direction",
            PhaseSpaceDimension::Energy => "energy",
            PhaseSpaceDimension::Time => "time",
            PhaseSpaceDimension::Weight => "weight",
        };
        f.write_str(name)
    }
}

/// One counter per phase-space dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DimensionCounters([u64; PhaseSpaceDimension::COUNT]);

impl DimensionCounters {
    pub fn get(&self, dimension: PhaseSpaceDimension) -> u64 {
        self.0[dimension.index()]
    }

    pub fn add(&mut self, dimension: PhaseSpaceDimension, count: u64) {
        self.0[dimension.index()] += count;
    }

    pub fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += theirs;
        }
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|c| *c == 0)
    }
}

/// Trial and sample counts recorded by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SamplingCounters {
    /// Phase-space sampling attempts, per dimension.
    pub dimension_trials: DimensionCounters,
    /// Accepted phase-space samples, per dimension.
    pub dimension_samples: DimensionCounters,
    /// Source sampling attempts.
    pub trials: u64,
    /// Accepted source samples.
    pub samples: u64,
}

impl SamplingCounters {
    /// Record one attempt on a dimension.
    pub fn record_trial(&mut self, dimension: PhaseSpaceDimension) {
        self.dimension_trials.add(dimension, 1);
    }

    /// Record one accepted sample on a dimension.
    pub fn record_sample(&mut self, dimension: PhaseSpaceDimension) {
        self.dimension_samples.add(dimension, 1);
    }

    pub fn merge(&mut self, other: &Self) {
        self.dimension_trials.merge(&other.dimension_trials);
        self.dimension_samples.merge(&other.dimension_samples);
        self.trials += other.trials;
        self.samples += other.samples;
    }

    /// Sampling efficiency (samples / trials), 1.0 when nothing was tried.
    pub fn efficiency(&self) -> f64 {
        if self.trials == 0 {
            1.0
        } else {
            self.samples as f64 / self.trials as f64
        }
    }

    /// Sampling efficiency of one dimension.
    pub fn dimension_efficiency(&self, dimension: PhaseSpaceDimension) -> f64 {
        let trials = self.dimension_trials.get(dimension);
        if trials == 0 {
            1.0
        } else {
            self.dimension_samples.get(dimension) as f64 / trials as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trials == 0
            && self.samples == 0
            && self.dimension_trials.is_empty()
            && self.dimension_samples.is_empty()
    }
}

/// Per-history tally kept by an event handler.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryTally {
    /// Histories committed.
    pub histories: u64,
    /// Source particles committed (probes excluded).
    pub source_particles: u64,
    /// Adjoint probe particles committed.
    pub probe_particles: u64,
    /// Source particles that started outside the geometry.
    pub lost_particles: u64,
    /// Sum of committed particle weights.
    pub total_weight: f64,
}

impl HistoryTally {
    pub fn merge(&mut self, other: &Self) {
        self.histories += other.histories;
        self.source_particles += other.source_particles;
        self.probe_particles += other.probe_particles;
        self.lost_particles += other.lost_particles;
        self.total_weight += other.total_weight;
    }

    pub fn is_empty(&self) -> bool {
        self.histories == 0
            && self.source_particles == 0
            && self.probe_particles == 0
            && self.lost_particles == 0
    }
}

/// Everything one worker thread accumulates between two rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerCounters {
    pub sampling: SamplingCounters,
    pub tally: HistoryTally,
}

impl WorkerCounters {
    pub fn merge(&mut self, other: &Self) {
        self.sampling.merge(&other.sampling);
        self.tally.merge(&other.tally);
    }

    pub fn is_empty(&self) -> bool {
        self.sampling.is_empty() && self.tally.is_empty()
    }

    /// Sum a sequence of counters.
    pub fn sum<'a>(counters: impl IntoIterator<Item = &'a WorkerCounters>) -> Self {
        counters.into_iter().fold(Self::default(), |mut acc, c| {
            acc.merge(c);
            acc
        })
    }
}
