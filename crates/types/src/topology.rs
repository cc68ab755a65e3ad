//! Process topology of a run.

use crate::Rank;

/// Layout of the ranks taking part in a run.
///
/// A single process computes histories itself. With more than one rank, the
/// root coordinates (issues batches, reduces statistics, writes archives) and
/// every other rank is a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankTopology {
    local: Rank,
    size: usize,
}

impl RankTopology {
    /// Create a topology for `local` in a group of `size` ranks.
    pub fn new(local: Rank, size: usize) -> Self {
        Self {
            local,
            size: size.max(1),
        }
    }

    /// Topology of a single-process run.
    pub fn single() -> Self {
        Self::new(Rank::ROOT, 1)
    }

    /// The local rank.
    pub fn local_rank(&self) -> Rank {
        self.local
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> usize {
        self.size
    }

    // Derived methods

    /// The coordinating rank.
    pub fn root(&self) -> Rank {
        Rank::ROOT
    }

    /// Whether the group has more than one rank.
    pub fn is_distributed(&self) -> bool {
        self.size > 1
    }

    /// Whether the local rank is the root.
    pub fn is_root(&self) -> bool {
        self.local.is_root()
    }

    /// Whether the local rank runs histories.
    pub fn is_worker(&self) -> bool {
        !self.is_distributed() || !self.is_root()
    }

    /// Number of ranks that run histories.
    pub fn worker_count(&self) -> u64 {
        if self.is_distributed() {
            (self.size - 1) as u64
        } else {
            1
        }
    }

    /// Ranks that run histories.
    pub fn worker_ranks(&self) -> Vec<Rank> {
        if self.is_distributed() {
            (1..self.size as u32).map(Rank).collect()
        } else {
            vec![Rank::ROOT]
        }
    }
}
