//! Manager errors.

use mcrun_archive::ArchiveError;
use mcrun_core::{CommError, ReductionError};
use mcrun_dispatch::DispatchError;
use mcrun_planner::PlanError;
use mcrun_types::UnknownArchiveFormat;
use thiserror::Error;

/// Invalid run setup, detected before any history runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Simulation name must not be empty")]
    EmptyName,

    #[error("Thread count must be at least 1")]
    NoThreads,

    #[error("Cannot extend a run by 0 histories")]
    NoHistoriesToAdd,

    #[error(transparent)]
    UnknownFormat(#[from] UnknownArchiveFormat),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Errors surfaced by the simulation manager.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Reduction error: {0}")]
    Reduction(#[from] ReductionError),

    #[error("Communication error: {0}")]
    Comm(#[from] CommError),

    #[error("Export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PlanError> for SimulationError {
    fn from(err: PlanError) -> Self {
        SimulationError::Config(ConfigError::Plan(err))
    }
}
