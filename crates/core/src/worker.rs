//! Per-thread worker context.

use mcrun_types::{WorkerCounters, WorkerIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// State owned by one worker thread while it runs histories.
///
/// The random stream is reseeded from the history number at the start of
/// every history, so a history produces the same particles regardless of the
/// thread or rank that runs it.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    worker: WorkerIndex,
    seed: u64,
    history: u64,
    rng: ChaCha8Rng,
    /// Counters accumulated since the last reduction.
    pub counters: WorkerCounters,
}

impl WorkerContext {
    pub fn new(worker: WorkerIndex, seed: u64) -> Self {
        Self {
            worker,
            seed,
            history: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            counters: WorkerCounters::default(),
        }
    }

    pub fn worker(&self) -> WorkerIndex {
        self.worker
    }

    /// History currently being run.
    pub fn history(&self) -> u64 {
        self.history
    }

    /// Prepare the context for `history`.
    pub fn begin_history(&mut self, history: u64) {
        self.history = history;
        self.rng = ChaCha8Rng::seed_from_u64(self.seed ^ history.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Take the accumulated counters, leaving zeros behind.
    pub fn take_counters(&mut self) -> WorkerCounters {
        std::mem::take(&mut self.counters)
    }

    pub fn reset(&mut self) {
        self.counters = WorkerCounters::default();
    }
}
