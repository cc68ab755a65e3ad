//! Core data model for the history scheduling engine.
//!
//! Plain data only: configuration, the derived batch plan, the persisted
//! simulation state, statistics counters and identifiers. Behaviour lives in
//! the crates that own each concern.

mod config;
mod counters;
mod identifiers;
mod plan;
mod state;
mod topology;

pub use config::{InvalidWallTime, RunConfiguration};
pub use counters::{
    DimensionCounters, HistoryTally, PhaseSpaceDimension, SamplingCounters, WorkerCounters,
};
pub use identifiers::{CellId, ComponentId, Rank, WorkerIndex};
pub use plan::BatchPlan;
pub use state::{
    ArchiveFormat, RendezvousFileMode, SimulationState, UnknownArchiveFormat,
};
pub use topology::RankTopology;
