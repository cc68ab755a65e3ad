//! Communicator abstraction between ranks.
//!
//! Ranks exchange tagged byte payloads. Typed helpers bincode-encode values
//! on top of the raw send/receive primitives, and build the collective
//! operations the engine needs (gather to root, broadcast from root).

use crate::CommError;
use mcrun_types::Rank;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Message kinds exchanged between ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Collective gather towards the root.
    Gather,
    /// Collective broadcast from the root.
    Broadcast,
    /// Worker asks the root for the next batch.
    WorkRequest,
    /// Root answers a work request.
    WorkReply,
    /// Worker rank finished its share of a rendezvous.
    RankFinished,
    /// Root tells workers what to do next.
    Order,
    /// Root closes a rendezvous, committed or aborted.
    Verdict,
    /// Sent by an endpoint that is going away.
    Hangup,
}

/// A received message.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: Rank,
    pub tag: MessageTag,
    pub payload: Vec<u8>,
}

/// Point-to-point primitives of a rank group.
///
/// Collectives are built on top of these. A rank that leaves the group must
/// make pending and future receives that wait on it fail with
/// [`CommError::Disconnected`] instead of blocking.
pub trait Communicator: Send + Sync {
    /// The local rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send a payload to `to`.
    fn send(&self, to: Rank, tag: MessageTag, payload: Vec<u8>) -> Result<(), CommError>;

    /// Block until a message matching `from` (any rank when `None`) and one
    /// of `tags` arrives. Non-matching messages stay queued.
    fn recv(&self, from: Option<Rank>, tags: &[MessageTag]) -> Result<Envelope, CommError>;
}

/// Encode a value for transport.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CommError> {
    bincode::serialize(value).map_err(|e| CommError::Codec(e.to_string()))
}

/// Decode a transported value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CommError> {
    bincode::deserialize(bytes).map_err(|e| CommError::Codec(e.to_string()))
}

/// Send a typed message.
pub fn send_message<T: Serialize>(
    comm: &dyn Communicator,
    to: Rank,
    tag: MessageTag,
    value: &T,
) -> Result<(), CommError> {
    comm.send(to, tag, encode(value)?)
}

/// Receive a typed message.
pub fn recv_message<T: DeserializeOwned>(
    comm: &dyn Communicator,
    from: Option<Rank>,
    tag: MessageTag,
) -> Result<(Rank, T), CommError> {
    let envelope = comm.recv(from, &[tag])?;
    Ok((envelope.from, decode(&envelope.payload)?))
}

/// Gather one value per rank on `root`.
///
/// Returns the values ordered by rank on the root and `None` elsewhere.
pub fn gather<T>(comm: &dyn Communicator, value: &T, root: Rank) -> Result<Option<Vec<T>>, CommError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    if comm.rank() != root {
        send_message(comm, root, MessageTag::Gather, value)?;
        return Ok(None);
    }

    let mut values = Vec::with_capacity(comm.size());
    for rank in (0..comm.size() as u32).map(Rank) {
        if rank == root {
            values.push(value.clone());
        } else {
            let (_, received) = recv_message::<T>(comm, Some(rank), MessageTag::Gather)?;
            values.push(received);
        }
    }
    Ok(Some(values))
}

/// Broadcast the root's value to every rank.
///
/// `value` is only read on the root.
pub fn broadcast<T>(comm: &dyn Communicator, value: Option<&T>, root: Rank) -> Result<T, CommError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    if comm.rank() == root {
        let value = value.ok_or(CommError::MissingContribution(root))?;
        let bytes = encode(value)?;
        for rank in (0..comm.size() as u32).map(Rank).filter(|r| *r != root) {
            comm.send(rank, MessageTag::Broadcast, bytes.clone())?;
        }
        Ok(value.clone())
    } else {
        recv_message(comm, Some(root), MessageTag::Broadcast).map(|(_, v)| v)
    }
}

/// Communicator of a single-process run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> Rank {
        Rank::ROOT
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, to: Rank, _tag: MessageTag, _payload: Vec<u8>) -> Result<(), CommError> {
        Err(CommError::InvalidRank(to))
    }

    fn recv(&self, from: Option<Rank>, _tags: &[MessageTag]) -> Result<Envelope, CommError> {
        Err(CommError::InvalidRank(from.unwrap_or(Rank::ROOT)))
    }
}
