//! Rendezvous archive persistence.
//!
//! An archive bundles the [`SimulationState`], the [`RunConfiguration`] and
//! the collaborators of a run at a rendezvous boundary. Archives are plain
//! serde values; the encoding is chosen per file by [`ArchiveFormat`] and
//! recognised on load by the file extension.
//!
//! [`SimulationState`]: mcrun_types::SimulationState
//! [`RunConfiguration`]: mcrun_types::RunConfiguration
//! [`ArchiveFormat`]: mcrun_types::ArchiveFormat

mod archive;
pub mod codec;
mod error;
pub mod naming;
mod store;

pub use archive::{
    ArchiveHeader, CollaboratorBundle, RendezvousArchive, ARCHIVE_MAGIC, ARCHIVE_VERSION,
};
pub use error::ArchiveError;
pub use store::ArchiveStore;
