//! In-process communicator.
//!
//! Each rank is a thread of the same process; messages travel over crossbeam
//! channels. Used for multi-rank runs on one machine and for tests.
//!
//! Dropping an endpoint sends a hangup to every peer, so a rank that exits
//! early (error or panic) fails the receives waiting on it.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use mcrun_core::{CommError, Communicator, Envelope, MessageTag};
use mcrun_types::Rank;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// One rank's endpoint of an in-process group.
pub struct LocalCommunicator {
    rank: Rank,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// Messages received while waiting for something else.
    pending: Mutex<VecDeque<Envelope>>,
    timeout: Option<Duration>,
}

impl LocalCommunicator {
    /// Create the endpoints of a group of `size` ranks, ordered by rank.
    pub fn group(size: usize) -> Vec<LocalCommunicator> {
        let size = size.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel::unbounded()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(i, inbox)| LocalCommunicator {
                rank: Rank(i as u32),
                peers: senders.clone(),
                inbox,
                pending: Mutex::new(VecDeque::new()),
                timeout: None,
            })
            .collect()
    }

    /// Fail receives that wait longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn is_from(envelope: &Envelope, from: Option<Rank>) -> bool {
    from.map_or(true, |f| envelope.from == f)
}

/// Whether `envelope` answers a receive on `from`/`tags`, either as a match
/// or as the hangup of a rank being waited on.
fn answers(envelope: &Envelope, from: Option<Rank>, tags: &[MessageTag]) -> bool {
    is_from(envelope, from) && (envelope.tag == MessageTag::Hangup || tags.contains(&envelope.tag))
}

fn deliver(envelope: Envelope) -> Result<Envelope, CommError> {
    match envelope.tag {
        MessageTag::Hangup => Err(CommError::Disconnected(envelope.from)),
        _ => Ok(envelope),
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, to: Rank, tag: MessageTag, payload: Vec<u8>) -> Result<(), CommError> {
        let peer = self.peers.get(to.index()).ok_or(CommError::InvalidRank(to))?;
        peer.send(Envelope {
            from: self.rank,
            tag,
            payload,
        })
        .map_err(|_| CommError::Disconnected(to))
    }

    fn recv(&self, from: Option<Rank>, tags: &[MessageTag]) -> Result<Envelope, CommError> {
        if let Some(from) = from {
            if from.index() >= self.size() {
                return Err(CommError::InvalidRank(from));
            }
        }

        let mut pending = self.pending.lock();
        if let Some(envelope) = pending
            .iter()
            .position(|e| answers(e, from, tags))
            .and_then(|i| pending.remove(i))
        {
            return deliver(envelope);
        }

        loop {
            let envelope = match self.timeout {
                Some(timeout) => self.inbox.recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => CommError::Timeout(self.rank),
                    RecvTimeoutError::Disconnected => CommError::Disconnected(self.rank),
                })?,
                None => self
                    .inbox
                    .recv()
                    .map_err(|_| CommError::Disconnected(self.rank))?,
            };
            if answers(&envelope, from, tags) {
                return deliver(envelope);
            }
            pending.push_back(envelope);
        }
    }
}

impl Drop for LocalCommunicator {
    fn drop(&mut self) {
        for (i, peer) in self.peers.iter().enumerate() {
            if i != self.rank.index() {
                // Peers that already left have nothing to be told.
                let _ = peer.send(Envelope {
                    from: self.rank,
                    tag: MessageTag::Hangup,
                    payload: Vec::new(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcrun_core::{broadcast, gather};
    use std::thread;

    #[test]
    fn test_recv_skips_other_tags() {
        let group = LocalCommunicator::group(2);
        group[1].send(Rank(0), MessageTag::Order, vec![1]).unwrap();
        group[1].send(Rank(0), MessageTag::Gather, vec![2]).unwrap();

        let gathered = group[0].recv(None, &[MessageTag::Gather]).unwrap();
        assert_eq!(gathered.payload, vec![2]);

        // The skipped message is still delivered later.
        let order = group[0].recv(Some(Rank(1)), &[MessageTag::Order]).unwrap();
        assert_eq!(order.payload, vec![1]);
    }

    #[test]
    fn test_invalid_rank() {
        let group = LocalCommunicator::group(2);
        assert!(matches!(
            group[0].send(Rank(5), MessageTag::Order, vec![]),
            Err(CommError::InvalidRank(Rank(5)))
        ));
    }

    #[test]
    fn test_timeout() {
        let mut group = LocalCommunicator::group(2);
        let _peer = group.pop();
        let comm = group.remove(0).with_timeout(Duration::from_millis(10));
        assert!(matches!(
            comm.recv(None, &[MessageTag::Order]),
            Err(CommError::Timeout(Rank(0)))
        ));
    }

    #[test]
    fn test_dropped_peer_fails_waiting_receive() {
        let mut group = LocalCommunicator::group(3);
        let second = group.pop().unwrap();
        let first = group.pop().unwrap();
        let root = group.pop().unwrap();

        first.send(Rank(0), MessageTag::Gather, vec![1]).unwrap();
        drop(first);

        // Messages sent before leaving are still delivered.
        assert_eq!(root.recv(Some(Rank(1)), &[MessageTag::Gather]).unwrap().payload, vec![1]);
        assert!(matches!(
            root.recv(Some(Rank(1)), &[MessageTag::Order]),
            Err(CommError::Disconnected(Rank(1)))
        ));

        // A hangup from a rank nobody waits on stays queued.
        root.send(Rank(2), MessageTag::Order, vec![7]).unwrap();
        assert_eq!(second.recv(Some(Rank(0)), &[MessageTag::Order]).unwrap().payload, vec![7]);
        assert!(matches!(
            second.recv(None, &[MessageTag::Gather]),
            Err(CommError::Disconnected(Rank(1)))
        ));
    }

    #[test]
    fn test_gather_and_broadcast_across_threads() {
        let handles: Vec<_> = LocalCommunicator::group(4)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mine = comm.rank().0 as u64 * 10;
                    let gathered = gather(&comm, &mine, Rank::ROOT).unwrap();
                    let total = gathered.map(|values| values.iter().sum::<u64>());
                    let shared = broadcast(&comm, total.as_ref(), Rank::ROOT).unwrap();
                    (comm.rank(), shared)
                })
            })
            .collect();

        for handle in handles {
            let (_, shared) = handle.join().unwrap();
            assert_eq!(shared, 60);
        }
    }
}
