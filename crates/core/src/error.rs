//! Errors shared by the engine crates.

use mcrun_types::Rank;
use thiserror::Error;

/// Errors raised by a [`Communicator`](crate::Communicator).
#[derive(Debug, Error)]
pub enum CommError {
    #[error("{0} is not part of the communicator group")]
    InvalidRank(Rank),

    #[error("{0} disconnected")]
    Disconnected(Rank),

    #[error("No contribution received from {0}")]
    MissingContribution(Rank),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Unexpected message: {0}")]
    Protocol(String),

    #[error("{0} timed out waiting for a message")]
    Timeout(Rank),

    #[error("Run aborted by the coordinator")]
    Aborted,

    #[error("Coordinator aborted the run: {0}")]
    CoordinatorFailed(String),
}

/// A failed statistics reduction, annotated with the counter set involved.
#[derive(Debug, Error)]
pub enum ReductionError {
    #[error("Unable to reduce {counter_set}: {source}")]
    Communication {
        counter_set: String,
        #[source]
        source: CommError,
    },

    #[error("Unable to reduce {counter_set}: {message}")]
    Collaborator { counter_set: String, message: String },

    #[error("Unable to reduce {counter_set}: {source}")]
    Nested {
        counter_set: String,
        #[source]
        source: Box<ReductionError>,
    },
}

impl ReductionError {
    /// Wrap a communication failure.
    pub fn communication(counter_set: impl Into<String>, source: CommError) -> Self {
        ReductionError::Communication {
            counter_set: counter_set.into(),
            source,
        }
    }

    /// Report a collaborator-side failure.
    pub fn collaborator(counter_set: impl Into<String>, message: impl Into<String>) -> Self {
        ReductionError::Collaborator {
            counter_set: counter_set.into(),
            message: message.into(),
        }
    }

    /// Wrap an inner reduction failure under an outer counter set.
    pub fn nested(counter_set: impl Into<String>, source: ReductionError) -> Self {
        ReductionError::Nested {
            counter_set: counter_set.into(),
            source: Box::new(source),
        }
    }

    /// Name of the counter set that failed to reduce.
    pub fn counter_set(&self) -> &str {
        match self {
            ReductionError::Communication { counter_set, .. }
            | ReductionError::Collaborator { counter_set, .. }
            | ReductionError::Nested { counter_set, .. } => counter_set,
        }
    }
}
