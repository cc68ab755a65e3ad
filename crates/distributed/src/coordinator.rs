//! Coordinator side of a multi-rank run.

use crate::protocol::{
    CoordinatorOrder, RankReport, RendezvousOrder, RendezvousVerdict, WorkReply,
};
use crate::RemoteBatchQueue;
use mcrun_core::{decode, recv_message, send_message, CommError, Communicator, MessageTag};
use mcrun_dispatch::{StopCondition, StopReason};
use mcrun_types::{Rank, RankTopology};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of serving one rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeOutcome {
    /// One past the last history handed out.
    pub issued_end: u64,
    /// Histories the workers reported as run.
    pub histories_reported: u64,
    /// Why serving stopped before the range was exhausted.
    pub stop_reason: Option<StopReason>,
}

/// Drives the rank group through rendezvous.
///
/// The root hands out contiguous batches on request and never runs
/// histories itself; worker ranks follow its orders.
pub struct DistributedCoordinator {
    comm: Arc<dyn Communicator>,
    topology: RankTopology,
}

impl DistributedCoordinator {
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        let topology = RankTopology::new(comm.rank(), comm.size());
        Self { comm, topology }
    }

    pub fn topology(&self) -> RankTopology {
        self.topology
    }

    pub fn communicator(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Root side
    // ═══════════════════════════════════════════════════════════════════════

    /// Start a rendezvous on every worker and serve its batches.
    ///
    /// Returns once every worker rank reported it is done.
    pub fn run_rendezvous(
        &self,
        order: RendezvousOrder,
        stop: &StopCondition,
    ) -> Result<ServeOutcome, CommError> {
        let workers = self.topology.worker_ranks();
        for rank in &workers {
            send_message(
                self.communicator(),
                *rank,
                MessageTag::Order,
                &CoordinatorOrder::Rendezvous(order),
            )?;
        }
        self.serve(order, stop, &workers)
    }

    fn serve(
        &self,
        order: RendezvousOrder,
        stop: &StopCondition,
        workers: &[Rank],
    ) -> Result<ServeOutcome, CommError> {
        let comm = self.communicator();
        let batch_size = order.batch_size.max(1);
        let mut cursor = order.start;
        let mut stop_reason = None;
        let mut finished = BTreeSet::new();
        let mut histories_reported = 0;

        while finished.len() < workers.len() {
            let envelope = comm.recv(None, &[MessageTag::WorkRequest, MessageTag::RankFinished])?;
            match envelope.tag {
                MessageTag::WorkRequest => {
                    if stop_reason.is_none() && cursor < order.end {
                        stop_reason = stop.should_stop();
                    }
                    let reply = if cursor >= order.end || stop_reason.is_some() {
                        WorkReply::Exhausted
                    } else {
                        let end = cursor.saturating_add(batch_size).min(order.end);
                        let batch = WorkReply::Batch { start: cursor, end };
                        cursor = end;
                        batch
                    };
                    send_message(comm, envelope.from, MessageTag::WorkReply, &reply)?;
                }
                MessageTag::RankFinished => {
                    let report: RankReport = decode(&envelope.payload)?;
                    histories_reported += report.histories;
                    finished.insert(envelope.from);
                }
                other => {
                    return Err(CommError::Protocol(format!("{other:?} while serving batches")));
                }
            }
        }

        if histories_reported != cursor - order.start {
            warn!(
                issued = cursor - order.start,
                reported = histories_reported,
                "Workers reported a different history count than was issued"
            );
        }
        debug!(
            rendezvous = order.rendezvous,
            issued_end = cursor,
            "Rendezvous served"
        );

        Ok(ServeOutcome {
            issued_end: cursor,
            histories_reported,
            stop_reason,
        })
    }

    /// Close the current rendezvous on every worker.
    ///
    /// Workers block on the verdict after reducing, so the root must send one
    /// whether or not it managed to persist the rendezvous.
    pub fn close_rendezvous(&self, verdict: &RendezvousVerdict) -> Result<(), CommError> {
        for rank in self.topology.worker_ranks() {
            send_message(self.communicator(), rank, MessageTag::Verdict, verdict)?;
        }
        Ok(())
    }

    /// Tell every worker the run is over.
    pub fn terminate(&self) -> Result<(), CommError> {
        for rank in self.topology.worker_ranks() {
            send_message(
                self.communicator(),
                rank,
                MessageTag::Order,
                &CoordinatorOrder::Terminate,
            )?;
        }
        Ok(())
    }

    /// Tell every reachable worker the run failed.
    ///
    /// Ranks that already left are skipped.
    pub fn abort(&self, reason: &str) {
        let order = CoordinatorOrder::Abort(reason.to_string());
        for rank in self.topology.worker_ranks() {
            if let Err(e) = send_message(self.communicator(), rank, MessageTag::Order, &order) {
                debug!(%rank, error = %e, "Could not deliver abort");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Worker side
    // ═══════════════════════════════════════════════════════════════════════

    /// Block until the root sends the next order.
    pub fn await_order(&self) -> Result<CoordinatorOrder, CommError> {
        recv_message(self.communicator(), Some(self.topology.root()), MessageTag::Order)
            .map(|(_, order)| order)
    }

    /// Block until the root closes the rendezvous.
    ///
    /// An aborted rendezvous, or an abort order sent because the root failed
    /// while serving, is returned as [`CommError::CoordinatorFailed`].
    pub fn await_verdict(&self) -> Result<(), CommError> {
        let envelope = self.comm.recv(
            Some(self.topology.root()),
            &[MessageTag::Verdict, MessageTag::Order],
        )?;
        if envelope.tag == MessageTag::Order {
            return match decode::<CoordinatorOrder>(&envelope.payload)? {
                CoordinatorOrder::Abort(reason) => Err(CommError::CoordinatorFailed(reason)),
                other => Err(CommError::Protocol(format!(
                    "{other:?} before the rendezvous was closed"
                ))),
            };
        }
        match decode::<RendezvousVerdict>(&envelope.payload)? {
            RendezvousVerdict::Committed => Ok(()),
            RendezvousVerdict::Aborted(reason) => Err(CommError::CoordinatorFailed(reason)),
        }
    }

    /// Queue that claims batches from the root.
    pub fn batch_queue(&self, stop: StopCondition) -> RemoteBatchQueue<'_> {
        RemoteBatchQueue::new(self.communicator(), self.topology.root(), stop)
    }

    /// Tell the root this rank has run its share of the rendezvous.
    pub fn report_finished(&self, report: RankReport) -> Result<(), CommError> {
        send_message(
            self.communicator(),
            self.topology.root(),
            MessageTag::RankFinished,
            &report,
        )
    }
}
