//! Batch queue backed by the coordinator.

use crate::protocol::{CoordinatorOrder, WorkReply};
use mcrun_core::{decode, CommError, Communicator, MessageTag};
use mcrun_dispatch::{BatchQueue, StopCondition};
use mcrun_types::Rank;
use parking_lot::Mutex;
use std::ops::Range;

/// Worker-side queue: each claim is a round trip to the root.
///
/// Requests from the threads of one rank are serialized so every reply goes
/// back to the thread that asked.
pub struct RemoteBatchQueue<'a> {
    comm: &'a dyn Communicator,
    root: Rank,
    stop: StopCondition,
    exhausted: Mutex<bool>,
}

impl<'a> RemoteBatchQueue<'a> {
    pub fn new(comm: &'a dyn Communicator, root: Rank, stop: StopCondition) -> Self {
        Self {
            comm,
            root,
            stop,
            exhausted: Mutex::new(false),
        }
    }
}

impl BatchQueue for RemoteBatchQueue<'_> {
    fn next_batch(&self) -> Result<Option<Range<u64>>, CommError> {
        let mut exhausted = self.exhausted.lock();
        if *exhausted {
            return Ok(None);
        }
        if self.stop.should_stop().is_some() {
            *exhausted = true;
            return Ok(None);
        }

        self.comm.send(self.root, MessageTag::WorkRequest, Vec::new())?;
        let envelope = self
            .comm
            .recv(Some(self.root), &[MessageTag::WorkReply, MessageTag::Order])?;

        if envelope.tag == MessageTag::Order {
            // The root gave up on the run while we were waiting.
            *exhausted = true;
            return Err(match decode::<CoordinatorOrder>(&envelope.payload)? {
                CoordinatorOrder::Abort(reason) => CommError::CoordinatorFailed(reason),
                _ => CommError::Aborted,
            });
        }

        match decode::<WorkReply>(&envelope.payload)? {
            WorkReply::Batch { start, end } => Ok(Some(start..end)),
            WorkReply::Exhausted => {
                *exhausted = true;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalCommunicator;
    use mcrun_core::send_message;

    #[test]
    fn test_abort_while_waiting_for_work() {
        let group = LocalCommunicator::group(2);
        send_message(
            &group[0],
            Rank(1),
            MessageTag::Order,
            &CoordinatorOrder::Abort("archive write failed".into()),
        )
        .unwrap();

        let queue = RemoteBatchQueue::new(&group[1], Rank::ROOT, StopCondition::never());
        let err = queue.next_batch().unwrap_err();
        assert!(matches!(err, CommError::CoordinatorFailed(ref r) if r == "archive write failed"));
        // Later claims see an exhausted queue.
        assert_eq!(queue.next_batch().unwrap(), None);
    }

    #[test]
    fn test_batches_until_exhausted() {
        let group = LocalCommunicator::group(2);
        let batch = WorkReply::Batch { start: 3, end: 6 };
        send_message(&group[0], Rank(1), MessageTag::WorkReply, &batch).unwrap();
        send_message(&group[0], Rank(1), MessageTag::WorkReply, &WorkReply::Exhausted).unwrap();

        let queue = RemoteBatchQueue::new(&group[1], Rank::ROOT, StopCondition::never());
        assert_eq!(queue.next_batch().unwrap(), Some(3..6));
        assert_eq!(queue.next_batch().unwrap(), None);
        let request = group[0].recv(Some(Rank(1)), &[MessageTag::WorkRequest]).unwrap();
        assert!(request.payload.is_empty());
    }
}
