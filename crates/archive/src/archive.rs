//! Archive contents.

use mcrun_types::{ArchiveFormat, RunConfiguration, SimulationState};
use serde::{Deserialize, Serialize};

/// Identifies an archive written by this crate.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"MCRA";

/// Current archive layout version.
pub const ARCHIVE_VERSION: u32 = 1;

/// Leading section of every archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub format: ArchiveFormat,
}

impl ArchiveHeader {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            format,
        }
    }
}

/// Collaborators saved alongside the state.
///
/// Saved from borrowed collaborators (`CollaboratorBundle<&M, &S, &E>`) and
/// loaded into owned ones; both serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorBundle<M, S, E> {
    pub model: M,
    pub source: S,
    pub event_handler: E,
}

/// Everything needed to resume a run from a rendezvous boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendezvousArchive<C> {
    pub header: ArchiveHeader,
    pub state: SimulationState,
    pub config: RunConfiguration,
    pub collaborators: C,
}

impl<C> RendezvousArchive<C> {
    pub fn new(state: SimulationState, config: RunConfiguration, collaborators: C) -> Self {
        Self {
            header: ArchiveHeader::new(state.archive_format),
            state,
            config,
            collaborators,
        }
    }
}
