//! Per-thread worker contexts.

use mcrun_core::WorkerContext;
use mcrun_types::{WorkerCounters, WorkerIndex};
use parking_lot::{Mutex, MutexGuard};

/// One [`WorkerContext`] per pool thread, indexed by thread.
///
/// During a dispatch each slot is locked only by the thread that owns it, so
/// the locks never contend. Between dispatches the reducer reads every slot.
#[derive(Debug)]
pub struct WorkerArena {
    slots: Vec<Mutex<WorkerContext>>,
}

impl WorkerArena {
    /// Create `threads` contexts sharing the run seed.
    pub fn new(threads: usize, seed: u64) -> Self {
        let slots = (0..threads.max(1))
            .map(|i| Mutex::new(WorkerContext::new(WorkerIndex(i), seed)))
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lock the context of thread `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a thread of the owning pool.
    pub fn slot(&self, index: usize) -> MutexGuard<'_, WorkerContext> {
        self.slots[index].lock()
    }

    /// Sum every slot's counters without clearing them.
    pub fn fold(&self) -> WorkerCounters {
        self.slots
            .iter()
            .fold(WorkerCounters::default(), |mut acc, slot| {
                acc.merge(&slot.lock().counters);
                acc
            })
    }

    /// Zero every slot's counters.
    pub fn clear(&self) {
        for slot in &self.slots {
            slot.lock().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_then_clear() {
        let arena = WorkerArena::new(3, 0);
        arena.slot(0).counters.tally.histories = 2;
        arena.slot(2).counters.tally.histories = 5;

        assert_eq!(arena.fold().tally.histories, 7);
        // Folding does not consume.
        assert_eq!(arena.fold().tally.histories, 7);

        arena.clear();
        assert!(arena.fold().is_empty());
    }

    #[test]
    fn test_zero_threads_gets_one_slot() {
        assert_eq!(WorkerArena::new(0, 0).len(), 1);
    }
}
