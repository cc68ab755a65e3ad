//! When a run is finished.

use std::time::{Duration, Instant};

/// Stopping rule of one invocation: a history count, a wall-time budget,
/// both (whichever comes first) or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCriterion {
    Unbounded,
    Histories { wall: u64 },
    WallTime { deadline: Instant },
    Mixed { wall: u64, deadline: Instant },
}

impl CompletionCriterion {
    /// Build from an absolute history wall (0 = none) and a budget measured
    /// from `started`. A budget reaching past what `Instant` can represent
    /// never expires.
    pub fn new(history_wall: u64, wall_time: Option<Duration>, started: Instant) -> Self {
        let deadline = wall_time.and_then(|budget| started.checked_add(budget));
        match (history_wall, deadline) {
            (0, None) => CompletionCriterion::Unbounded,
            (wall, None) => CompletionCriterion::Histories { wall },
            (0, Some(deadline)) => CompletionCriterion::WallTime { deadline },
            (wall, Some(deadline)) => CompletionCriterion::Mixed { wall, deadline },
        }
    }

    pub fn history_wall(&self) -> Option<u64> {
        match *self {
            CompletionCriterion::Histories { wall } | CompletionCriterion::Mixed { wall, .. } => {
                Some(wall)
            }
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match *self {
            CompletionCriterion::WallTime { deadline }
            | CompletionCriterion::Mixed { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    pub fn is_complete(&self, next_history: u64, now: Instant) -> bool {
        self.history_wall().is_some_and(|wall| next_history >= wall)
            || self.deadline().is_some_and(|deadline| now >= deadline)
    }
}
