//! Thread-parallel history loop.

use crate::{BatchQueue, ProgressMonitor, WorkerArena};
use mcrun_core::{CommError, HistoryPipeline};
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;
use tracing::debug;

/// Errors raised while dispatching histories.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Thread count must be at least 1")]
    NoThreads,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Batch queue failed: {0}")]
    Queue(#[from] CommError),
}

/// What one dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub batches: u64,
    pub histories: u64,
}

impl DispatchReport {
    fn merge(mut self, other: DispatchReport) -> Self {
        self.batches += other.batches;
        self.histories += other.histories;
        self
    }
}

/// Runs batches from a [`BatchQueue`] on a fixed pool of threads.
///
/// Every pool thread loops claiming batches until the queue is exhausted,
/// running each history of a batch through the pipeline with its own
/// [`WorkerContext`](mcrun_core::WorkerContext). A batch is never split or
/// abandoned once claimed.
pub struct HistoryDispatcher {
    pool: ThreadPool,
    arena: WorkerArena,
    progress: ProgressMonitor,
}

impl HistoryDispatcher {
    pub fn new(threads: usize, seed: u64, snapshots_per_batch: u64) -> Result<Self, DispatchError> {
        if threads == 0 {
            return Err(DispatchError::NoThreads);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mcrun-worker-{i}"))
            .build()
            .map_err(|e| DispatchError::ThreadPool(e.to_string()))?;

        Ok(Self {
            arena: WorkerArena::new(pool.current_num_threads(), seed),
            pool,
            progress: ProgressMonitor::new(snapshots_per_batch),
        })
    }

    pub fn threads(&self) -> usize {
        self.arena.len()
    }

    pub fn arena(&self) -> &WorkerArena {
        &self.arena
    }

    pub fn progress(&self) -> &ProgressMonitor {
        &self.progress
    }

    /// Run batches until `queue` is exhausted.
    ///
    /// Blocks until every thread has finished its last batch.
    pub fn dispatch<Q, P>(&self, queue: &Q, pipeline: &P) -> Result<DispatchReport, DispatchError>
    where
        Q: BatchQueue + ?Sized,
        P: HistoryPipeline + ?Sized,
    {
        let results = self.pool.broadcast(|ctx| {
            let mut worker = self.arena.slot(ctx.index());
            let mut report = DispatchReport::default();

            while let Some(batch) = queue.next_batch()? {
                let interval = self.progress.snapshot_interval(batch.end - batch.start);
                let mut pending = 0;
                for history in batch.clone() {
                    pipeline.simulate_history(history, &mut worker);
                    pending += 1;
                    if pending == interval {
                        self.progress.record(pending);
                        pending = 0;
                    }
                }
                self.progress.record(pending);

                report.batches += 1;
                report.histories += batch.end - batch.start;
            }
            Ok::<_, CommError>(report)
        });

        let report = results
            .into_iter()
            .try_fold(DispatchReport::default(), |acc, r| r.map(|r| acc.merge(r)))?;
        debug!(
            batches = report.batches,
            histories = report.histories,
            "Dispatch complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalBatchQueue, StopCondition};
    use mcrun_core::{CancellationToken, WorkerContext};
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::ops::Range;

    /// Records every history it runs.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u64>>,
    }

    impl HistoryPipeline for Recorder {
        fn simulate_history(&self, history: u64, ctx: &mut WorkerContext) {
            ctx.counters.tally.histories += 1;
            self.seen.lock().push(history);
        }
    }

    #[test]
    fn test_every_history_runs_once() {
        let dispatcher = HistoryDispatcher::new(4, 0, 3).unwrap();
        let queue = LocalBatchQueue::new(0..1000, 7, StopCondition::never());
        let recorder = Recorder::default();

        let report = dispatcher.dispatch(&queue, &recorder).unwrap();

        let seen = recorder.seen.lock();
        let unique: BTreeSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 1000);
        assert_eq!(unique.len(), 1000);
        assert_eq!(report.histories, 1000);
        assert_eq!(report.batches, 143);
        assert_eq!(dispatcher.arena().fold().tally.histories, 1000);
        assert_eq!(dispatcher.progress().completed(), 1000);
    }

    /// Cancels the token once a given history runs.
    struct CancelAt {
        at: u64,
        token: CancellationToken,
    }

    impl HistoryPipeline for CancelAt {
        fn simulate_history(&self, history: u64, ctx: &mut WorkerContext) {
            ctx.counters.tally.histories += 1;
            if history == self.at {
                self.token.cancel();
            }
        }
    }

    #[test]
    fn test_cancellation_finishes_claimed_batches() {
        let token = CancellationToken::new();
        let dispatcher = HistoryDispatcher::new(2, 0, 1).unwrap();
        let queue = LocalBatchQueue::new(
            0..10_000,
            10,
            StopCondition::never().with_token(token.clone()),
        );
        let pipeline = CancelAt { at: 25, token };

        let report = dispatcher.dispatch(&queue, &pipeline).unwrap();

        // Completed histories are exactly the issued prefix.
        assert_eq!(report.histories, queue.issued_end());
        assert!(queue.issued_end() < 10_000);
        assert_eq!(queue.issued_end() % 10, 0);
    }

    struct FailingQueue;

    impl BatchQueue for FailingQueue {
        fn next_batch(&self) -> Result<Option<Range<u64>>, CommError> {
            Err(CommError::Aborted)
        }
    }

    #[test]
    fn test_queue_failure_propagates() {
        let dispatcher = HistoryDispatcher::new(2, 0, 1).unwrap();
        let result = dispatcher.dispatch(&FailingQueue, &Recorder::default());
        assert!(matches!(result, Err(DispatchError::Queue(CommError::Aborted))));
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            HistoryDispatcher::new(0, 0, 1),
            Err(DispatchError::NoThreads)
        ));
    }
}
