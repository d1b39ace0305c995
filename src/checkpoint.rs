//! Checkpointing of the kernel object graph.
//!
//! A [`Checkpoint`] captures everything the kernel owns at quiescence:
//! the current cycle, the activity-id counter, the vortex contents, each
//! link's runtime queues, and the barrier's period, link map, and
//! outbound batches. The transport handle is deliberately excluded and
//! rebuilt on restore. Components are user state: they are rebuilt from
//! the configuration and registry, and the kernel state is overlaid.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, Event};
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::queue::ActivityQueue;
use crate::registry::ComponentRegistry;
use crate::simulation::{RunPhase, Simulation};
use crate::time::TimeConverter;
use crate::transport::{RemoteEvent, Transport};
use crate::types::{ActivityId, LinkId, Rank, SimTime};

/// Runtime state of one link.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkState {
    /// The link's dense id.
    pub id: LinkId,
    /// Queued polling events, in (time, id) order.
    pub polling: Vec<Activity>,
    /// Pending init events on the recipient side.
    pub init_recv: Vec<Event>,
    /// Init events staged for a cross-rank exchange.
    pub init_send: Vec<Event>,
}

/// Serialized barrier state. The transport handle is not part of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// The barrier period.
    pub period: TimeConverter,
    /// Wire id to local link mapping.
    pub link_map: BTreeMap<LinkId, LinkId>,
    /// Outbound batches not yet exchanged.
    pub outbound: BTreeMap<Rank, Vec<RemoteEvent>>,
}

/// A serializable snapshot of one rank's kernel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The captured rank's index.
    pub rank: Rank,
    /// Simulated cycle at capture.
    pub current_cycle: SimTime,
    /// Next activity id to allocate.
    pub next_activity_id: ActivityId,
    /// Vortex contents in pop order.
    pub vortex: Vec<Activity>,
    /// Per-link runtime queues.
    pub links: Vec<LinkState>,
    /// Barrier state, if this rank has peers.
    pub sync: Option<SyncState>,
}

impl Checkpoint {
    /// Captures a snapshot of the simulation's kernel state.
    pub fn capture(sim: &Simulation) -> Checkpoint {
        let links = sim
            .links
            .iter()
            .map(|link| LinkState {
                id: link.id,
                polling: link
                    .polling_queue
                    .as_ref()
                    .map(|q| q.iter().cloned().collect())
                    .unwrap_or_default(),
                init_recv: link.init_recv.iter().cloned().collect(),
                init_send: link.init_send.clone(),
            })
            .collect();

        Checkpoint {
            rank: sim.rank,
            current_cycle: sim.current_cycle,
            next_activity_id: sim.next_activity_id,
            vortex: sim.vortex.iter().cloned().collect(),
            links,
            sync: sim.sync.as_ref().map(|s| SyncState {
                period: s.period(),
                link_map: s.link_map().clone(),
                outbound: s.outbound_snapshot(),
            }),
        }
    }

    /// Rebuilds a simulation from configuration plus this snapshot.
    ///
    /// Components come fresh from the registry; kernel queues, cycle,
    /// and counters are overlaid; the transport is taken from the caller
    /// (it is never part of a checkpoint). The restored simulation
    /// resumes the main loop directly, skipping init and setup.
    pub fn restore(
        self,
        config: &SimConfig,
        registry: &ComponentRegistry,
        transport: Option<Box<dyn Transport>>,
    ) -> SimResult<Simulation> {
        let mut sim = Simulation::build(config, registry, transport)?;
        if sim.rank != self.rank {
            return Err(SimError::Config(crate::config::ConfigError::Validation(
                format!(
                    "checkpoint was captured on rank {} but the transport is rank {}",
                    self.rank, sim.rank
                ),
            )));
        }

        sim.current_cycle = self.current_cycle;
        sim.next_activity_id = self.next_activity_id;

        sim.vortex.clear();
        for activity in self.vortex {
            sim.vortex.insert(activity);
        }

        for state in self.links {
            let link = sim
                .links
                .get_mut(state.id)
                .ok_or(SimError::UnknownLink(state.id))?;
            if let Some(queue) = link.polling_queue.as_mut() {
                for activity in state.polling {
                    queue.insert(activity);
                }
            }
            link.init_recv = state.init_recv.into();
            link.init_send = state.init_send;
        }

        match (self.sync, sim.sync.as_mut()) {
            (Some(state), Some(sync)) => {
                if state.period != sync.period() {
                    return Err(SimError::Config(crate::config::ConfigError::Validation(
                        format!(
                            "checkpoint period {} does not match configured period {}",
                            state.period,
                            sync.period()
                        ),
                    )));
                }
                sync.restore_outbound(state.outbound);
            }
            (None, None) => {}
            _ => {
                return Err(SimError::Config(crate::config::ConfigError::Validation(
                    "checkpoint and configuration disagree on the presence of a barrier"
                        .to_string(),
                )))
            }
        }

        sim.phase = RunPhase::Run;
        tracing::info!(
            rank = sim.rank,
            cycle = sim.current_cycle,
            "simulation restored from checkpoint"
        );
        Ok(sim)
    }

    /// Serializes the checkpoint as JSON to a writer.
    pub fn to_writer<W: Write>(&self, writer: W) -> SimResult<()> {
        serde_json::to_writer(writer, self)
            .map_err(|e| SimError::Config(crate::config::ConfigError::Json(e)))
    }

    /// Deserializes a checkpoint from a JSON reader.
    pub fn from_reader<R: Read>(reader: R) -> SimResult<Checkpoint> {
        serde_json::from_reader(reader)
            .map_err(|e| SimError::Config(crate::config::ConfigError::Json(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TimeVortex;

    #[test]
    fn test_checkpoint_json_roundtrip() {
        let mut vortex = TimeVortex::new();
        vortex.insert(Activity::event(
            300,
            5,
            Event::on_link(0, serde_json::json!({"seq": 3})),
        ));
        vortex.insert(Activity::stop(500, 6));

        let ckpt = Checkpoint {
            rank: 0,
            current_cycle: 250,
            next_activity_id: 7,
            vortex: vortex.iter().cloned().collect(),
            links: vec![LinkState {
                id: 0,
                ..Default::default()
            }],
            sync: Some(SyncState {
                period: TimeConverter::new(100),
                link_map: BTreeMap::from([(0, 0)]),
                outbound: BTreeMap::from([(1, vec![])]),
            }),
        };

        let mut buf = Vec::new();
        ckpt.to_writer(&mut buf).unwrap();
        let back = Checkpoint::from_reader(buf.as_slice()).unwrap();

        assert_eq!(back.current_cycle, 250);
        assert_eq!(back.next_activity_id, 7);
        assert_eq!(back.vortex.len(), 2);
        assert_eq!(back.vortex[0].time, 300);
        assert_eq!(back.sync.unwrap().period, TimeConverter::new(100));
    }
}
