//! The cross-rank barrier.
//!
//! A [`Sync`] is a recurring activity at priority 25 with period *P*,
//! the lookahead window. Each execution ships every outbound batch to
//! its peer, waits for every posted transfer, and re-injects the
//! inbound events into local links with their delay reconstructed from
//! the sender's absolute delivery stamp. Because no cross-rank link may
//! have latency below *P*, nothing generated inside a window is due
//! before the window closes, and one exchange per window is correct.
//!
//! The same machinery runs before t=0 as the init-phase exchange, which
//! ferries untimed configuration events between link endpoints.

use std::collections::BTreeMap;

use crate::activity::{Activity, Event};
use crate::error::{SimError, SimResult};
use crate::link::LinkRegistry;
use crate::queue::{ActivityQueue, TimeVortex};
use crate::stats::KernelStats;
use crate::time::TimeConverter;
use crate::transport::{RemoteEvent, Transport};
use crate::types::{ActivityId, LinkId, Rank, SimTime, NO_LINK};

/// Outbound batch of events bound for one peer rank.
#[derive(Clone, Debug, Default)]
pub struct SyncQueue {
    activities: Vec<RemoteEvent>,
}

impl SyncQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the batch.
    pub fn push(&mut self, event: RemoteEvent) {
        self.activities.push(event);
    }

    /// Takes the whole batch, leaving the queue empty.
    pub fn take(&mut self) -> Vec<RemoteEvent> {
        std::mem::take(&mut self.activities)
    }

    /// The batched events, in send order.
    pub fn activities(&self) -> &[RemoteEvent] {
        &self.activities
    }

    /// Number of batched events.
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Returns true if nothing is batched.
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

/// Per-peer communication state.
#[derive(Debug, Default)]
struct PeerQueues {
    outbound: SyncQueue,
}

/// The periodic barrier action of one rank.
pub struct Sync {
    period: TimeConverter,
    comm_map: BTreeMap<Rank, PeerQueues>,
    link_map: BTreeMap<LinkId, LinkId>,
    transport: Box<dyn Transport>,
}

impl Sync {
    /// Creates a barrier with the given period over a transport handle.
    pub fn new(period: TimeConverter, transport: Box<dyn Transport>) -> Self {
        Self {
            period,
            comm_map: BTreeMap::new(),
            link_map: BTreeMap::new(),
            transport,
        }
    }

    /// The barrier period in core cycles.
    pub fn period_cycles(&self) -> SimTime {
        self.period.factor()
    }

    /// The period converter.
    pub fn period(&self) -> TimeConverter {
        self.period
    }

    /// This rank's index.
    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    /// Ensures a communication entry exists for `peer`. Called by the
    /// sending side of every cross-rank link.
    pub fn register_peer(&mut self, peer: Rank) {
        self.comm_map.entry(peer).or_default();
    }

    /// Registers the receiving side of a cross-rank link: events arriving
    /// with `wire_id` are re-injected into `local_link`.
    pub fn register_link(&mut self, peer: Rank, wire_id: LinkId, local_link: LinkId) {
        self.register_peer(peer);
        self.link_map.insert(wire_id, local_link);
    }

    /// Batches an outbound event for `peer`'s next exchange.
    pub fn queue_remote(&mut self, peer: Rank, event: RemoteEvent) {
        self.comm_map.entry(peer).or_default().outbound.push(event);
    }

    /// The local link registered for a wire id, if any.
    pub fn local_link(&self, wire_id: LinkId) -> Option<LinkId> {
        self.link_map.get(&wire_id).copied()
    }

    /// The registered wire-to-local link mapping.
    pub fn link_map(&self) -> &BTreeMap<LinkId, LinkId> {
        &self.link_map
    }

    /// Snapshot of the outbound batches per peer (for checkpointing).
    pub fn outbound_snapshot(&self) -> BTreeMap<Rank, Vec<RemoteEvent>> {
        self.comm_map
            .iter()
            .map(|(r, q)| (*r, q.outbound.activities().to_vec()))
            .collect()
    }

    /// Restores outbound batches captured by [`Sync::outbound_snapshot`].
    pub fn restore_outbound(&mut self, snapshot: BTreeMap<Rank, Vec<RemoteEvent>>) {
        for (peer, events) in snapshot {
            let entry = self.comm_map.entry(peer).or_default();
            entry.outbound = SyncQueue {
                activities: events,
            };
        }
    }

    /// Whole-job init consensus, forwarded to the transport.
    pub fn all_init_done(&mut self, done: bool) -> SimResult<bool> {
        self.transport.all_init_done(done)
    }

    /// One barrier execution at cycle `now`.
    ///
    /// Ships every outbound batch, waits for every peer's batch, then
    /// walks the inbound events: each is matched to its local link and
    /// re-inserted at its stamped delivery cycle. The sender already
    /// applied the link latency, and the lookahead window guarantees the
    /// stamp is not behind this barrier; an earlier stamp or an unknown
    /// inbound link id is a fatal bug.
    pub fn execute(
        &mut self,
        now: SimTime,
        vortex: &mut TimeVortex,
        links: &mut LinkRegistry,
        next_id: &mut ActivityId,
        stats: &mut KernelStats,
    ) -> SimResult<()> {
        let outbound: BTreeMap<Rank, Vec<RemoteEvent>> = self
            .comm_map
            .iter_mut()
            .map(|(r, q)| (*r, q.outbound.take()))
            .collect();

        let inbound = self.transport.exchange(outbound)?;

        for (peer, events) in inbound {
            for ev in events {
                let local = self
                    .link_map
                    .get(&ev.link_id)
                    .copied()
                    .ok_or(SimError::UnknownRemoteLink { link_id: ev.link_id })?;
                let link = links
                    .get(local)
                    .ok_or(SimError::UnknownRemoteLink { link_id: ev.link_id })?;

                if ev.delivery_time < now {
                    return Err(SimError::Causality(format!(
                        "event from rank {peer} on link `{}` due at {} arrived behind barrier cycle {}",
                        link.name, ev.delivery_time, now
                    )));
                }

                let id = *next_id;
                *next_id += 1;
                vortex.insert(
                    Activity::event(ev.delivery_time, id, Event::on_link(local, ev.payload))
                        .with_priority(ev.priority),
                );
                stats.remote_events_received += 1;
            }
        }

        Ok(())
    }

    /// The init-phase variant: drains every cross-rank link's staged init
    /// data, exchanges it, and enqueues arrivals on the receiving links.
    ///
    /// No timing applies. The link id of each arrival is reset to the
    /// unassigned sentinel so the receiving link re-stamps it on enqueue.
    /// Returns true if any data moved in either direction, which keeps
    /// the init loop running another phase.
    pub fn exchange_link_init_data(&mut self, links: &mut LinkRegistry) -> SimResult<bool> {
        for link in links.iter_mut() {
            if let Some(peer) = link.peer_rank {
                for ev in link.take_staged_init() {
                    self.comm_map
                        .entry(peer)
                        .or_default()
                        .outbound
                        .push(RemoteEvent {
                            delivery_time: 0,
                            priority: crate::types::DEFAULT_PRIORITY,
                            link_id: ev.link_id,
                            payload: ev.payload,
                        });
                }
            }
        }

        let outbound: BTreeMap<Rank, Vec<RemoteEvent>> = self
            .comm_map
            .iter_mut()
            .map(|(r, q)| (*r, q.outbound.take()))
            .collect();
        let moved_out: usize = outbound.values().map(Vec::len).sum();

        let inbound = self.transport.exchange(outbound)?;

        let mut moved_in = 0usize;
        for (_peer, events) in inbound {
            for ev in events {
                let local = self
                    .link_map
                    .get(&ev.link_id)
                    .copied()
                    .ok_or(SimError::UnknownRemoteLink { link_id: ev.link_id })?;
                let link = links
                    .get_mut(local)
                    .ok_or(SimError::UnknownRemoteLink { link_id: ev.link_id })?;
                link.send_init_data(Event::on_link(NO_LINK, ev.payload));
                moved_in += 1;
            }
        }

        if moved_out + moved_in > 0 {
            tracing::debug!(
                rank = self.transport.rank(),
                sent = moved_out,
                received = moved_in,
                "init data exchanged"
            );
        }
        Ok(moved_out + moved_in > 0)
    }
}

impl std::fmt::Debug for Sync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sync")
            .field("period", &self.period)
            .field("peers", &self.comm_map.keys().collect::<Vec<_>>())
            .field("links", &self.link_map.len())
            .finish()
    }
}
