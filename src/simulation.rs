//! The per-rank simulation: owner of the time vortex and the main loop.
//!
//! One [`Simulation`] exists per rank. It is built from a shared
//! configuration, drives every component through the lifecycle
//! (init phases, setup, main loop, finish), and advances simulated time
//! by draining the vortex in (time, priority, id) order. There is no
//! global singleton: handlers receive an explicit [`SimContext`] borrowed
//! from the simulation for the duration of one dispatch.

use std::collections::BTreeMap;

use crate::activity::{Activity, ActivityKind, Event};
use crate::component::Component;
use crate::config::{ConfigError, SimConfig};
use crate::error::{SimError, SimResult};
use crate::link::{Delivery, Link, LinkRegistry};
use crate::queue::{ActivityQueue, TimeVortex};
use crate::registry::ComponentRegistry;
use crate::stats::KernelStats;
use crate::sync::Sync;
use crate::time::TimeConverter;
use crate::transport::{RemoteEvent, Transport};
use crate::types::{ActivityId, ComponentId, LinkId, Rank, SimTime, DEFAULT_PRIORITY};

/// Where in the lifecycle a rank currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunPhase {
    Init,
    Setup,
    Run,
    Done,
}

type ComponentMap = BTreeMap<ComponentId, Box<dyn Component>>;

/// The per-rank kernel context handed to component handlers.
///
/// All mutation of the vortex and links during a dispatch goes through
/// this context, which keeps the single-threaded ownership story simple:
/// the component being dispatched is borrowed from the component map,
/// everything else from the rest of the simulation.
pub struct SimContext<'a> {
    now: SimTime,
    rank: Rank,
    num_ranks: u32,
    phase: RunPhase,
    vortex: &'a mut TimeVortex,
    links: &'a mut LinkRegistry,
    sync: Option<&'a mut Sync>,
    next_activity_id: &'a mut ActivityId,
    stats: &'a mut KernelStats,
}

impl<'a> SimContext<'a> {
    /// The current simulated cycle.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// This rank's index.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Total number of ranks in the job.
    pub fn num_ranks(&self) -> u32 {
        self.num_ranks
    }

    fn alloc_id(&mut self) -> ActivityId {
        let id = *self.next_activity_id;
        *self.next_activity_id += 1;
        id
    }

    /// The link sent on by `component`'s output `port`, if any.
    pub fn out_link(&self, component: ComponentId, port: &str) -> Option<LinkId> {
        self.links.find_sender(component, port)
    }

    /// The link received on by `component`'s input `port`, if any.
    pub fn in_link(&self, component: ComponentId, port: &str) -> Option<LinkId> {
        self.links.find_recipient(component, port)
    }

    /// A link looked up by its configuration name.
    pub fn named_link(&self, name: &str) -> Option<LinkId> {
        self.links.find_by_name(name)
    }

    /// Sends an event on a link with the given extra delay.
    ///
    /// The delivery cycle is `now + max(delay, link latency)`. Local
    /// handler links insert into the vortex, polling links into their
    /// queue, and cross-rank links into the barrier's outbound batch.
    /// Timed sends are illegal during the init phase.
    pub fn send(
        &mut self,
        link_id: LinkId,
        delay: SimTime,
        payload: serde_json::Value,
    ) -> SimResult<()> {
        if self.phase == RunPhase::Init {
            return Err(SimError::Lifecycle(
                "timed send during the init phase; use send_init_data".to_string(),
            ));
        }
        let now = self.now;
        let link = self
            .links
            .get_mut(link_id)
            .ok_or(SimError::UnknownLink(link_id))?;
        let time = link.delivery_time(now, delay);
        self.stats.events_sent += 1;

        if let Some(peer) = link.peer_rank {
            let sync = self.sync.as_mut().ok_or_else(|| {
                SimError::Transport("cross-rank send without a barrier".to_string())
            })?;
            sync.queue_remote(
                peer,
                RemoteEvent {
                    delivery_time: time,
                    priority: DEFAULT_PRIORITY,
                    link_id: link.id,
                    payload,
                },
            );
            self.stats.remote_events_sent += 1;
            return Ok(());
        }

        let event = Event::on_link(link.id, payload);
        let id = {
            let id = *self.next_activity_id;
            *self.next_activity_id += 1;
            id
        };
        match link.delivery {
            Delivery::Polling => {
                let queue = link.polling_queue.as_mut().ok_or_else(|| {
                    SimError::Lifecycle(format!("polling link `{}` has no queue", link.name))
                })?;
                queue.insert(Activity::event(time, id, event));
            }
            Delivery::Handler(_) => {
                self.vortex.insert(Activity::event(time, id, event));
            }
        }
        Ok(())
    }

    /// Resolves the sender endpoint and sends in one step.
    pub fn send_on(
        &mut self,
        component: ComponentId,
        port: &str,
        delay: SimTime,
        payload: serde_json::Value,
    ) -> SimResult<()> {
        let link = self.out_link(component, port).ok_or_else(|| {
            SimError::Lifecycle(format!("component {component} has no output port `{port}`"))
        })?;
        self.send(link, delay, payload)
    }

    /// Drains every ready event (delivery time at or before now) from a
    /// polling link's queue, in order.
    pub fn poll(&mut self, link_id: LinkId) -> SimResult<Vec<(SimTime, Event)>> {
        let now = self.now;
        let link = self
            .links
            .get_mut(link_id)
            .ok_or(SimError::UnknownLink(link_id))?;
        let queue = link.polling_queue.as_mut().ok_or_else(|| {
            SimError::Lifecycle(format!("link `{}` is not a polling link", link.name))
        })?;
        Ok(queue.drain_ready(now))
    }

    /// Sends untimed configuration data on a link during the init phase.
    pub fn send_init_data(&mut self, link_id: LinkId, payload: serde_json::Value) -> SimResult<()> {
        if self.phase != RunPhase::Init {
            return Err(SimError::Lifecycle(
                "init data may only be sent during the init phase".to_string(),
            ));
        }
        let link = self
            .links
            .get_mut(link_id)
            .ok_or(SimError::UnknownLink(link_id))?;
        self.stats.init_events_sent += 1;
        if link.is_remote() {
            link.stage_init_data(Event::new(payload));
        } else {
            link.send_init_data(Event::new(payload));
        }
        Ok(())
    }

    /// Receives the next pending init event on a link, if any.
    pub fn recv_init_data(&mut self, link_id: LinkId) -> SimResult<Option<Event>> {
        let link = self
            .links
            .get_mut(link_id)
            .ok_or(SimError::UnknownLink(link_id))?;
        Ok(link.recv_init_data())
    }

    /// Registers a recurring clock for `component`. The first tick fires
    /// one period from now; the handler's return value keeps or cancels
    /// the clock.
    pub fn register_clock(&mut self, component: ComponentId, period: TimeConverter) -> SimResult<()> {
        if self.phase == RunPhase::Init {
            return Err(SimError::Lifecycle(
                "clocks may not be registered during the init phase".to_string(),
            ));
        }
        let cycles = period.factor();
        let time = self.now + cycles;
        let id = self.alloc_id();
        self.vortex.insert(Activity::clock(time, id, component, cycles));
        Ok(())
    }

    /// Requests end of simulation at the current cycle. The marker's
    /// sentinel priority lets everything else scheduled at this cycle
    /// run first.
    pub fn end_simulation(&mut self) {
        let time = self.now;
        let id = self.alloc_id();
        self.vortex.insert(Activity::stop(time, id));
    }

    /// Schedules the end-of-simulation marker at an absolute cycle.
    pub fn end_simulation_at(&mut self, time: SimTime) -> SimResult<()> {
        if time < self.now {
            return Err(SimError::Causality(format!(
                "end of simulation requested at {} behind cycle {}",
                time, self.now
            )));
        }
        let id = self.alloc_id();
        self.vortex.insert(Activity::stop(time, id));
        Ok(())
    }
}

/// One rank of the partitioned simulation.
pub struct Simulation {
    pub(crate) rank: Rank,
    pub(crate) num_ranks: u32,
    pub(crate) current_cycle: SimTime,
    pub(crate) vortex: TimeVortex,
    pub(crate) links: LinkRegistry,
    pub(crate) components: ComponentMap,
    pub(crate) sync: Option<Sync>,
    pub(crate) next_activity_id: ActivityId,
    pub(crate) stop_time: Option<SimTime>,
    pub(crate) phase: RunPhase,
    pub(crate) stats: KernelStats,
}

impl Simulation {
    /// Builds a rank from a shared configuration.
    ///
    /// Components assigned to this rank are constructed through the
    /// registry; links get dense ids from the configuration's link
    /// order, so cross-rank links carry mirrored ids on both endpoints
    /// without any exchange. A multi-rank configuration requires a
    /// transport; the barrier is created only when peers exist.
    pub fn build(
        config: &SimConfig,
        registry: &ComponentRegistry,
        transport: Option<Box<dyn Transport>>,
    ) -> SimResult<Self> {
        config.validate()?;

        let (rank, num_ranks) = match &transport {
            Some(t) => (t.rank(), t.num_ranks()),
            None => (0, 1),
        };
        if config.num_ranks() > num_ranks {
            return Err(ConfigError::Validation(format!(
                "configuration spans {} ranks but the transport provides {}",
                config.num_ranks(),
                num_ranks
            ))
            .into());
        }

        let mut sync = match transport {
            Some(t) if num_ranks > 1 => Some(Sync::new(
                TimeConverter::new(config.simulation.lookahead),
                t,
            )),
            _ => None,
        };

        let mut components: ComponentMap = BTreeMap::new();
        for (i, cc) in config.components.iter().enumerate() {
            if cc.rank == rank {
                let id = ComponentId::component(i as u32);
                let component = registry.create(&cc.component_type, id, &cc.params)?;
                components.insert(id, component);
            }
        }

        let mut links = LinkRegistry::new();
        for (i, lc) in config.links.iter().enumerate() {
            let link_id = i as LinkId;
            let (from_comp, from_port) = lc.from_endpoint()?;
            let (to_comp, to_port) = lc.to_endpoint()?;

            let src_idx = config.component_index(from_comp).ok_or_else(|| {
                ConfigError::Validation(format!("unknown component `{from_comp}`"))
            })?;
            let dst_idx = config.component_index(to_comp).ok_or_else(|| {
                ConfigError::Validation(format!("unknown component `{to_comp}`"))
            })?;
            let src_rank = config.components[src_idx].rank;
            let dst_rank = config.components[dst_idx].rank;
            if src_rank != rank && dst_rank != rank {
                continue;
            }

            let sid = ComponentId::component(src_idx as u32);
            let did = ComponentId::component(dst_idx as u32);
            let mut link = Link::new(&lc.name, sid, from_port, did, to_port)
                .with_latency(lc.latency);
            if lc.polling {
                link = link.polling();
            }

            if src_rank == rank && dst_rank != rank {
                // Outbound stub: sends route into the barrier.
                link = link.to_peer(dst_rank);
                links.insert(link_id, link);
                match sync.as_mut() {
                    Some(s) => s.register_peer(dst_rank),
                    None => {
                        return Err(ConfigError::Validation(format!(
                            "link `{}` crosses ranks but no transport is attached",
                            lc.name
                        ))
                        .into())
                    }
                }
            } else if src_rank != rank && dst_rank == rank {
                // Receiving side: a real handler link, fed by the barrier.
                links.insert(link_id, link);
                match sync.as_mut() {
                    Some(s) => s.register_link(src_rank, link_id, link_id),
                    None => {
                        return Err(ConfigError::Validation(format!(
                            "link `{}` crosses ranks but no transport is attached",
                            lc.name
                        ))
                        .into())
                    }
                }
            } else {
                links.insert(link_id, link);
            }
        }

        let mut sim = Simulation {
            rank,
            num_ranks,
            current_cycle: 0,
            vortex: TimeVortex::new(),
            links,
            components,
            sync,
            next_activity_id: 0,
            stop_time: config.simulation.stop_time,
            phase: RunPhase::Init,
            stats: KernelStats::new(),
        };

        // The barrier's first firing closes the first lookahead window.
        if let Some(period) = sim.sync.as_ref().map(Sync::period_cycles) {
            let id = sim.alloc_id();
            sim.vortex.insert(Activity::sync(period, id));
        }
        if let Some(stop) = sim.stop_time {
            let id = sim.alloc_id();
            sim.vortex.insert(Activity::stop(stop, id));
        }

        tracing::info!(
            rank = sim.rank,
            components = sim.components.len(),
            links = sim.links.len(),
            "simulation built"
        );
        Ok(sim)
    }

    fn alloc_id(&mut self) -> ActivityId {
        let id = self.next_activity_id;
        self.next_activity_id += 1;
        id
    }

    /// Splits the simulation into a dispatch context and the component
    /// map, so a handler can mutate the kernel without aliasing itself.
    fn split(&mut self) -> (SimContext<'_>, &mut ComponentMap) {
        let ctx = SimContext {
            now: self.current_cycle,
            rank: self.rank,
            num_ranks: self.num_ranks,
            phase: self.phase,
            vortex: &mut self.vortex,
            links: &mut self.links,
            sync: self.sync.as_mut(),
            next_activity_id: &mut self.next_activity_id,
            stats: &mut self.stats,
        };
        (ctx, &mut self.components)
    }

    /// Runs untimed init phases until every rank reports that no
    /// component asked for another phase and no init data moved.
    fn run_init_phases(&mut self) -> SimResult<()> {
        let mut phase = 0u32;
        loop {
            let mut again = false;
            let sent_before = self.stats.init_events_sent;

            let ids: Vec<ComponentId> = self.components.keys().copied().collect();
            for cid in ids {
                let (mut ctx, components) = self.split();
                if let Some(component) = components.get_mut(&cid) {
                    again |= component.init(phase, &mut ctx)?;
                }
            }

            let moved_local = self.stats.init_events_sent > sent_before;
            let moved_remote = match self.sync.as_mut() {
                Some(s) => s.exchange_link_init_data(&mut self.links)?,
                None => false,
            };

            let local_done = !again && !moved_local && !moved_remote;
            let done = match self.sync.as_mut() {
                Some(s) => s.all_init_done(local_done)?,
                None => local_done,
            };

            tracing::debug!(rank = self.rank, phase, done, "init phase complete");
            phase += 1;
            if done {
                return Ok(());
            }
        }
    }

    fn run_setup(&mut self) -> SimResult<()> {
        self.phase = RunPhase::Setup;
        let ids: Vec<ComponentId> = self.components.keys().copied().collect();
        for cid in ids {
            let (mut ctx, components) = self.split();
            if let Some(component) = components.get_mut(&cid) {
                component.setup(&mut ctx)?;
            }
        }
        Ok(())
    }

    fn run_finish(&mut self) -> SimResult<()> {
        let ids: Vec<ComponentId> = self.components.keys().copied().collect();
        for cid in ids {
            let (mut ctx, components) = self.split();
            if let Some(component) = components.get_mut(&cid) {
                component.finish(&mut ctx)?;
            }
        }
        Ok(())
    }

    /// Runs the simulation to completion: init phases, setup, the main
    /// loop, finish. A restored simulation (already past setup) resumes
    /// the main loop directly.
    ///
    /// The loop pops the earliest activity, advances the current cycle
    /// to its delivery time, and executes it. Recurring activities (the
    /// barrier, live clocks) re-insert themselves; everything else is
    /// consumed. The loop ends at the stop marker or when the vortex
    /// drains.
    pub fn run(&mut self) -> SimResult<()> {
        if self.phase == RunPhase::Init {
            self.run_init_phases()?;
            self.run_setup()?;
        }
        self.phase = RunPhase::Run;
        tracing::info!(rank = self.rank, cycle = self.current_cycle, "entering main loop");

        while let Some(activity) = self.vortex.pop() {
            if activity.time < self.current_cycle {
                return Err(SimError::Causality(format!(
                    "activity {} due at {} popped behind cycle {}",
                    activity.id, activity.time, self.current_cycle
                )));
            }
            self.current_cycle = activity.time;
            self.stats.activities_executed += 1;
            self.stats.observe_depth(self.vortex.len() + 1);

            match activity.kind {
                ActivityKind::Stop => {
                    tracing::info!(rank = self.rank, cycle = self.current_cycle, "stop marker");
                    break;
                }
                ActivityKind::SyncBarrier => {
                    let now = self.current_cycle;
                    let period = match self.sync.as_mut() {
                        Some(sync) => {
                            sync.execute(
                                now,
                                &mut self.vortex,
                                &mut self.links,
                                &mut self.next_activity_id,
                                &mut self.stats,
                            )?;
                            sync.period_cycles()
                        }
                        None => {
                            return Err(SimError::Lifecycle(
                                "barrier activity on a rank without a sync".to_string(),
                            ))
                        }
                    };
                    self.stats.sync_rounds += 1;
                    let id = self.alloc_id();
                    self.vortex.insert(Activity::sync(now + period, id));
                }
                ActivityKind::Clock { component, period } => {
                    self.stats.clock_ticks += 1;
                    let cycle = self.current_cycle;
                    let keep = {
                        let (mut ctx, components) = self.split();
                        let owner = components.get_mut(&component.parent()).ok_or_else(|| {
                            SimError::Component {
                                component: component.to_string(),
                                reason: "clock fired for an unknown component".to_string(),
                            }
                        })?;
                        owner.on_clock(cycle, &mut ctx)?
                    };
                    if keep {
                        let id = self.alloc_id();
                        self.vortex
                            .insert(Activity::clock(cycle + period, id, component, period));
                    }
                }
                ActivityKind::Event(event) => {
                    let handler = {
                        let link = self
                            .links
                            .get(event.link_id)
                            .ok_or(SimError::UnknownLink(event.link_id))?;
                        match link.handler() {
                            Some(h) => h.clone(),
                            None => {
                                return Err(SimError::Lifecycle(format!(
                                    "event for polling link `{}` reached the vortex",
                                    link.name
                                )))
                            }
                        }
                    };
                    {
                        let (mut ctx, components) = self.split();
                        let owner =
                            components.get_mut(&handler.target.parent()).ok_or_else(|| {
                                SimError::Component {
                                    component: handler.target.to_string(),
                                    reason: "event delivered to an unknown component".to_string(),
                                }
                            })?;
                        owner.on_event(&handler, event, &mut ctx)?;
                    }
                    self.stats.events_delivered += 1;
                }
            }
        }

        self.phase = RunPhase::Done;
        tracing::info!(
            rank = self.rank,
            cycle = self.current_cycle,
            activities = self.stats.activities_executed,
            "main loop finished"
        );
        self.run_finish()
    }

    /// The current simulated cycle.
    pub fn current_cycle(&self) -> SimTime {
        self.current_cycle
    }

    /// This rank's index.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Total number of ranks in the job.
    pub fn num_ranks(&self) -> u32 {
        self.num_ranks
    }

    /// Number of components on this rank.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// The rank's link registry.
    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// The rank's time vortex.
    pub fn vortex(&self) -> &TimeVortex {
        &self.vortex
    }

    /// Kernel counters for this rank.
    pub fn stats(&self) -> &KernelStats {
        &self.stats
    }

    /// Exports a JSON summary of the rank's kernel state.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "rank": self.rank,
            "num_ranks": self.num_ranks,
            "current_cycle": self.current_cycle,
            "vortex_depth": self.vortex.len(),
            "components": self.components.len(),
            "links": self.links.len(),
            "kernel": self.stats.to_json(),
        })
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("rank", &self.rank)
            .field("current_cycle", &self.current_cycle)
            .field("components", &self.components.len())
            .field("links", &self.links.len())
            .field("vortex_depth", &self.vortex.len())
            .finish()
    }
}
