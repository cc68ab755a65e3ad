//! Particle simulation manager.
//!
//! ```text
//!   ManagerFactory ──build──▶ ParticleSimulationManager
//!                                   │ run_simulation()
//!                                   ▼
//!   ┌──────────────── one rendezvous ────────────────┐
//!   │ HistoryDispatcher: threads claim batches and   │
//!   │ run source → geometry → event handler          │
//!   │ StatisticsAggregator: reduce to the root       │
//!   │ RendezvousController: archive, then advance    │
//!   └────────────────────────────────────────────────┘
//!          repeated until the CompletionCriterion holds
//!          or the run is cancelled
//! ```
//!
//! A run is restarted with [`ManagerFactory::from_archive`] from any archive
//! the controller wrote.

mod completion;
mod controller;
mod error;
mod factory;
mod manager;
mod summary;

pub use completion::CompletionCriterion;
pub use controller::{IdentityChange, RendezvousController};
pub use error::{ConfigError, SimulationError};
pub use factory::{ManagerFactory, RestartPolicy};
pub use manager::ParticleSimulationManager;
pub use summary::{SimulationData, SimulationStatus};

pub use mcrun_archive::{ArchiveStore, CollaboratorBundle, RendezvousArchive};
