//! Engine core: collaborator traits, worker context, cancellation and the
//! communicator abstraction.
//!
//! Reference collaborators ([`CellGeometry`], [`StandardSource`],
//! [`TallyEventHandler`]) are included so a run can be assembled without an
//! external physics package.

mod cancel;
mod comm;
mod error;
mod event_handler;
mod model;
mod particle;
pub mod source;
mod traits;
mod worker;

pub use cancel::CancellationToken;
pub use comm::{
    broadcast, decode, encode, gather, recv_message, send_message, Communicator, Envelope,
    MessageTag, SerialCommunicator,
};
pub use error::{CommError, ReductionError};
pub use event_handler::TallyEventHandler;
pub use model::CellGeometry;
pub use particle::{ParticleKind, SourceParticle};
pub use source::{
    ComponentVariant, EnergySpectrum, PointDistribution, SourceComponent, SourceError,
    StandardSource,
};
pub use traits::{
    CollaboratorPipeline, EventHandler, GeometryModel, HistoryPipeline, ParticleSource, Reducible,
};
pub use worker::WorkerContext;
