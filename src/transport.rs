//! Peer-to-peer transport between ranks.
//!
//! The barrier needs exactly two collective shapes: an all-or-nothing
//! batch exchange with the peers that share links with this rank, and a
//! whole-job consensus on init-phase completion. [`Transport`] captures
//! both; [`ChannelTransport`] implements them over in-process channels
//! so a multi-rank simulation can run as one thread per rank. An MPI
//! binding would implement the same trait with isend/irecv/wait-all.
//!
//! Transport handles are rebuilt on restart and never serialized.

use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::types::{LinkId, Priority, Rank, SimTime};

/// The wire form of an event crossing ranks.
///
/// Carries the absolute delivery time stamped by the sender; the
/// receiving barrier reconstructs the local delay from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    /// Absolute cycle the recipient should observe the event at.
    pub delivery_time: SimTime,
    /// Scheduling priority preserved across the hop.
    pub priority: Priority,
    /// Link id, identical on both endpoints.
    pub link_id: LinkId,
    /// Opaque user payload.
    pub payload: serde_json::Value,
}

/// A frame on the inter-rank wire.
#[derive(Clone, Debug)]
enum Frame {
    Events(Vec<RemoteEvent>),
    InitDone(bool),
}

/// Peer-to-peer messaging between ranks.
///
/// `exchange` is all-or-nothing: it returns only after every posted
/// transfer completed, so partial exchanges are impossible. Any failure
/// is fatal to the job.
pub trait Transport: Send {
    /// This rank's index.
    fn rank(&self) -> Rank;

    /// Total number of ranks in the job.
    fn num_ranks(&self) -> u32;

    /// Sends each outbound batch to its peer and receives one batch from
    /// every peer in the map. The peer set must match on both sides of
    /// every pairing; batches may be empty.
    fn exchange(
        &mut self,
        outbound: BTreeMap<Rank, Vec<RemoteEvent>>,
    ) -> SimResult<BTreeMap<Rank, Vec<RemoteEvent>>>;

    /// Whole-job consensus used by the init loop: returns true only when
    /// every rank passed `done = true` this round.
    fn all_init_done(&mut self, done: bool) -> SimResult<bool>;
}

/// In-process transport: a full mesh of channels, one rank per thread.
pub struct ChannelTransport {
    rank: Rank,
    num_ranks: u32,
    senders: BTreeMap<Rank, Sender<Frame>>,
    receivers: BTreeMap<Rank, Receiver<Frame>>,
}

impl ChannelTransport {
    /// Builds a fully connected mesh of `n` transports, index `i` in the
    /// returned vector belonging to rank `i`.
    pub fn mesh(n: u32) -> Vec<ChannelTransport> {
        let mut transports: Vec<ChannelTransport> = (0..n)
            .map(|r| ChannelTransport {
                rank: r as Rank,
                num_ranks: n,
                senders: BTreeMap::new(),
                receivers: BTreeMap::new(),
            })
            .collect();

        for i in 0..n as usize {
            for j in 0..n as usize {
                if i == j {
                    continue;
                }
                let (tx, rx) = channel();
                transports[i].senders.insert(j as Rank, tx);
                transports[j].receivers.insert(i as Rank, rx);
            }
        }

        transports
    }

    fn send_frame(&self, peer: Rank, frame: Frame) -> SimResult<()> {
        let sender = self
            .senders
            .get(&peer)
            .ok_or_else(|| SimError::Transport(format!("no channel to rank {peer}")))?;
        sender
            .send(frame)
            .map_err(|_| SimError::Transport(format!("rank {peer} disconnected")))
    }

    fn recv_frame(&self, peer: Rank) -> SimResult<Frame> {
        let receiver = self
            .receivers
            .get(&peer)
            .ok_or_else(|| SimError::Transport(format!("no channel from rank {peer}")))?;
        receiver
            .recv()
            .map_err(|_| SimError::Transport(format!("rank {peer} disconnected")))
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn num_ranks(&self) -> u32 {
        self.num_ranks
    }

    fn exchange(
        &mut self,
        outbound: BTreeMap<Rank, Vec<RemoteEvent>>,
    ) -> SimResult<BTreeMap<Rank, Vec<RemoteEvent>>> {
        // Post every send before awaiting any receive.
        let peers: Vec<Rank> = outbound.keys().copied().collect();
        for (peer, batch) in outbound {
            self.send_frame(peer, Frame::Events(batch))?;
        }

        let mut inbound = BTreeMap::new();
        for peer in peers {
            match self.recv_frame(peer)? {
                Frame::Events(batch) => {
                    inbound.insert(peer, batch);
                }
                Frame::InitDone(_) => {
                    return Err(SimError::Transport(format!(
                        "rank {peer} is out of step: init frame during event exchange"
                    )));
                }
            }
        }
        Ok(inbound)
    }

    fn all_init_done(&mut self, done: bool) -> SimResult<bool> {
        let peers: Vec<Rank> = self.senders.keys().copied().collect();
        for &peer in &peers {
            self.send_frame(peer, Frame::InitDone(done))?;
        }

        let mut all = done;
        for &peer in &peers {
            match self.recv_frame(peer)? {
                Frame::InitDone(peer_done) => all &= peer_done,
                Frame::Events(_) => {
                    return Err(SimError::Transport(format!(
                        "rank {peer} is out of step: event frame during init consensus"
                    )));
                }
            }
        }
        Ok(all)
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("rank", &self.rank)
            .field("num_ranks", &self.num_ranks)
            .finish()
    }
}
