//! History dispatch.
//!
//! A [`HistoryDispatcher`] owns a rayon pool and one [`WorkerContext`] slot
//! per pool thread. It pulls contiguous batches from a [`BatchQueue`] and
//! runs them through a [`HistoryPipeline`]:
//!
//! ```text
//!            ┌─────────────── BatchQueue ───────────────┐
//!            │  local: atomic cursor over [start, end)  │
//!            │  remote: work requests to the root rank  │
//!            └──────────────────────────────────────────┘
//!               ▲ claim           ▲ claim          ▲ claim
//!          thread 0          thread 1         thread N-1
//!          arena[0]          arena[1]         arena[N-1]
//! ```
//!
//! Stop conditions (cancellation, wall time) are checked between batches.
//!
//! [`WorkerContext`]: mcrun_core::WorkerContext
//! [`HistoryPipeline`]: mcrun_core::HistoryPipeline

mod arena;
mod dispatcher;
mod progress;
mod queue;

pub use arena::WorkerArena;
pub use dispatcher::{DispatchError, DispatchReport, HistoryDispatcher};
pub use progress::ProgressMonitor;
pub use queue::{BatchQueue, LocalBatchQueue, StopCondition, StopReason};
