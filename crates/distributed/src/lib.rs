//! Multi-rank coordination.
//!
//! With more than one rank, rank 0 is a pure coordinator: it hands out
//! batches, gathers statistics and writes archives. Every other rank runs
//! histories with its own thread pool.

mod coordinator;
mod local;
pub mod protocol;
mod remote;

pub use coordinator::{DistributedCoordinator, ServeOutcome};
pub use local::LocalCommunicator;
pub use protocol::{CoordinatorOrder, RankReport, RendezvousOrder, RendezvousVerdict, WorkReply};
pub use remote::RemoteBatchQueue;
