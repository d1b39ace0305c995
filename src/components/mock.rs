//! Mock component implementations for testing.
//!
//! These components provide simple, observable behaviors useful for
//! exercising the kernel: every interesting observation is exported
//! through shared handles (`Arc` counters and logs) so tests can read
//! results after a run, including across the thread-per-rank runner.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::activity::Event;
use crate::component::{BaseComponent, Component, SubComponent};
use crate::config::ConfigError;
use crate::error::SimResult;
use crate::link::Handler;
use crate::params::Params;
use crate::simulation::SimContext;
use crate::time::TimeConverter;
use crate::types::{ComponentId, LinkId, SimTime};

/// Shared log of delivery cycles, readable after a run.
pub type CycleLog = Arc<Mutex<Vec<SimTime>>>;

/// A probe that counts event deliveries and clock ticks.
///
/// With a `clock_period` parameter it registers a clock at setup and
/// ticks until the simulation ends.
#[derive(Debug)]
pub struct Counter {
    base: BaseComponent,
    /// Events delivered to this component.
    pub events: Arc<AtomicU64>,
    /// Clock handler invocations.
    pub ticks: Arc<AtomicU64>,
    clock_period: Option<SimTime>,
}

impl Counter {
    /// Creates a counter with fresh observation handles.
    pub fn new(id: ComponentId) -> Self {
        Self {
            base: BaseComponent::new(id, "counter"),
            events: Arc::new(AtomicU64::new(0)),
            ticks: Arc::new(AtomicU64::new(0)),
            clock_period: None,
        }
    }

    /// Builds from parameters: optional `clock_period` in cycles.
    pub fn from_params(id: ComponentId, params: &Params) -> Result<Self, ConfigError> {
        let mut counter = Self::new(id);
        if params.contains("clock_period") {
            counter.clock_period = Some(params.required("clock_period")?);
        }
        Ok(counter)
    }

    /// Shares the event counter with a test.
    pub fn with_event_counter(mut self, events: Arc<AtomicU64>) -> Self {
        self.events = events;
        self
    }
}

impl Component for Counter {
    fn id(&self) -> ComponentId {
        self.base.id()
    }

    fn setup(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        if let Some(period) = self.clock_period {
            ctx.register_clock(self.base.id(), TimeConverter::new(period))?;
        }
        Ok(())
    }

    fn on_event(
        &mut self,
        _handler: &Handler,
        _event: Event,
        _ctx: &mut SimContext<'_>,
    ) -> SimResult<()> {
        self.events.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_clock(&mut self, _cycle: SimTime, _ctx: &mut SimContext<'_>) -> SimResult<bool> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

/// An event source.
///
/// Parameters:
/// - `start`: send one seed event with this delay during setup
/// - `count` + `period`: emit `count` clocked events at `period`,
///   `2*period`, ... then cancel the clock
#[derive(Debug)]
pub struct Generator {
    base: BaseComponent,
    start: Option<SimTime>,
    count: u64,
    period: SimTime,
    emitted: u64,
    out: Option<LinkId>,
    /// Total events emitted.
    pub sent: Arc<AtomicU64>,
}

impl Generator {
    pub fn new(id: ComponentId) -> Self {
        Self {
            base: BaseComponent::new(id, "generator"),
            start: None,
            count: 0,
            period: 0,
            emitted: 0,
            out: None,
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Builds from parameters: optional `start`, `count`, `period`.
    pub fn from_params(id: ComponentId, params: &Params) -> Result<Self, ConfigError> {
        let mut generator = Self::new(id);
        if params.contains("start") {
            generator.start = Some(params.required("start")?);
        }
        generator.count = params.optional("count", 0)?;
        generator.period = params.optional("period", 0)?;
        if generator.count > 0 && generator.period == 0 {
            return Err(ConfigError::InvalidParam {
                key: "period".to_string(),
                value: "0".to_string(),
                reason: "clocked generation requires a positive period".to_string(),
            });
        }
        Ok(generator)
    }

    pub fn with_sent_counter(mut self, sent: Arc<AtomicU64>) -> Self {
        self.sent = sent;
        self
    }

    fn emit(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        if let Some(out) = self.out {
            let seq = self.sent.fetch_add(1, Ordering::Relaxed);
            ctx.send(out, 0, serde_json::json!({ "seq": seq }))?;
        }
        Ok(())
    }
}

impl Component for Generator {
    fn id(&self) -> ComponentId {
        self.base.id()
    }

    fn setup(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        self.out = ctx.out_link(self.base.id(), "out");
        if let Some(start) = self.start {
            if let Some(out) = self.out {
                let seq = self.sent.fetch_add(1, Ordering::Relaxed);
                ctx.send(out, start, serde_json::json!({ "seq": seq }))?;
            }
        }
        if self.count > 0 {
            ctx.register_clock(self.base.id(), TimeConverter::new(self.period))?;
        }
        Ok(())
    }

    fn on_clock(&mut self, _cycle: SimTime, ctx: &mut SimContext<'_>) -> SimResult<bool> {
        self.emit(ctx)?;
        self.emitted += 1;
        Ok(self.emitted < self.count)
    }
}

/// A consumer that logs delivery cycles and optionally re-sends.
///
/// Parameters:
/// - `step`: re-send on the own `out` port with this delay after each
///   delivery (0 disables)
/// - `limit`: stop re-sending once the next delivery would pass this
///   cycle
///
/// The relay owns a [`TapSub`] sub-component; events arriving on the
/// `tap` port are routed inward to it by id, exercising dispatch through
/// the parent's link namespace.
pub struct Relay {
    base: BaseComponent,
    step: SimTime,
    limit: SimTime,
    out: Option<LinkId>,
    tap: TapSub,
    /// Deliveries observed on the main port.
    pub received: Arc<AtomicU64>,
    /// Delivery cycles in arrival order.
    pub log: CycleLog,
}

impl Relay {
    pub fn new(id: ComponentId, step: SimTime, limit: SimTime) -> Self {
        let mut base = BaseComponent::new(id, "relay");
        let tap_id = base.next_subcomponent_id();
        Self {
            base,
            step,
            limit,
            out: None,
            tap: TapSub::new(tap_id),
            received: Arc::new(AtomicU64::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Builds from parameters: optional `step` and `limit`.
    pub fn from_params(id: ComponentId, params: &Params) -> Result<Self, ConfigError> {
        let step = params.optional("step", 0)?;
        let limit = params.optional("limit", 0)?;
        Ok(Self::new(id, step, limit))
    }

    pub fn with_received_counter(mut self, received: Arc<AtomicU64>) -> Self {
        self.received = received;
        self
    }

    pub fn with_log(mut self, log: CycleLog) -> Self {
        self.log = log;
        self
    }

    /// Events observed by the owned tap sub-component.
    pub fn tap_count(&self) -> u64 {
        self.tap.seen.load(Ordering::Relaxed)
    }

    /// Shares the tap's counter with a test.
    pub fn with_tap_counter(mut self, seen: Arc<AtomicU64>) -> Self {
        self.tap.seen = seen;
        self
    }
}

impl Component for Relay {
    fn id(&self) -> ComponentId {
        self.base.id()
    }

    fn setup(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        self.out = ctx.out_link(self.base.id(), "out");
        self.tap.setup(ctx)
    }

    fn on_event(
        &mut self,
        handler: &Handler,
        event: Event,
        ctx: &mut SimContext<'_>,
    ) -> SimResult<()> {
        // Sub-component traffic is recognized by id and routed inward.
        if handler.target == self.tap.id() || handler.port == "tap" {
            return self.tap.on_event(handler, event, ctx);
        }

        let now = ctx.now();
        self.received.fetch_add(1, Ordering::Relaxed);
        self.log.lock().push(now);

        if self.step > 0 && now + self.step <= self.limit {
            // Resolved lazily so a restored component keeps relaying.
            if self.out.is_none() {
                self.out = ctx.out_link(self.base.id(), "out");
            }
            if let Some(out) = self.out {
                ctx.send(out, self.step, event.payload)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        self.tap.finish(ctx)
    }
}

/// A trivial sub-component counting the events its parent routes to it.
pub struct TapSub {
    base: BaseComponent,
    /// Events routed inward.
    pub seen: Arc<AtomicU64>,
}

impl TapSub {
    pub fn new(id: ComponentId) -> Self {
        Self {
            base: BaseComponent::for_subcomponent(id, "relay.tap"),
            seen: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl SubComponent for TapSub {
    fn id(&self) -> ComponentId {
        self.base.id()
    }

    fn on_event(
        &mut self,
        _handler: &Handler,
        _event: Event,
        _ctx: &mut SimContext<'_>,
    ) -> SimResult<()> {
        self.seen.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// A clocked drain of a polling link.
///
/// Parameters:
/// - `clock_period`: drain cadence in cycles (required)
/// - `expect`: cancel the clock after observing this many events
///   (0 keeps it running)
///
/// Each tick drains every ready event from the `in` polling link and
/// appends the observed delivery cycles to the log.
pub struct PollingCollector {
    base: BaseComponent,
    clock_period: SimTime,
    expect: u64,
    input: Option<LinkId>,
    /// Delivery cycles of drained events, in drain order.
    pub log: CycleLog,
    /// Total drained events.
    pub drained: Arc<AtomicU64>,
}

impl PollingCollector {
    pub fn new(id: ComponentId, clock_period: SimTime, expect: u64) -> Self {
        Self {
            base: BaseComponent::new(id, "collector"),
            clock_period,
            expect,
            input: None,
            log: Arc::new(Mutex::new(Vec::new())),
            drained: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Builds from parameters: required `clock_period`, optional `expect`.
    pub fn from_params(id: ComponentId, params: &Params) -> Result<Self, ConfigError> {
        let clock_period = params.required("clock_period")?;
        let expect = params.optional("expect", 0)?;
        Ok(Self::new(id, clock_period, expect))
    }

    pub fn with_log(mut self, log: CycleLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_drained_counter(mut self, drained: Arc<AtomicU64>) -> Self {
        self.drained = drained;
        self
    }
}

impl Component for PollingCollector {
    fn id(&self) -> ComponentId {
        self.base.id()
    }

    fn setup(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        self.input = ctx.in_link(self.base.id(), "in");
        ctx.register_clock(self.base.id(), TimeConverter::new(self.clock_period))
    }

    fn on_clock(&mut self, _cycle: SimTime, ctx: &mut SimContext<'_>) -> SimResult<bool> {
        if self.input.is_none() {
            self.input = ctx.in_link(self.base.id(), "in");
        }
        if let Some(input) = self.input {
            let ready = ctx.poll(input)?;
            let mut log = self.log.lock();
            for (time, _event) in &ready {
                log.push(*time);
            }
            self.drained.fetch_add(ready.len() as u64, Ordering::Relaxed);
        }
        let total = self.drained.load(Ordering::Relaxed);
        Ok(self.expect == 0 || total < self.expect)
    }
}

/// Sends one init-phase data event during phase 0.
///
/// Parameters: optional `data` string payload.
pub struct InitSender {
    base: BaseComponent,
    data: String,
}

impl InitSender {
    pub fn new(id: ComponentId, data: impl Into<String>) -> Self {
        Self {
            base: BaseComponent::new(id, "init-sender"),
            data: data.into(),
        }
    }

    pub fn from_params(id: ComponentId, params: &Params) -> Result<Self, ConfigError> {
        let data = params.optional("data", "init".to_string())?;
        Ok(Self::new(id, data))
    }
}

impl Component for InitSender {
    fn id(&self) -> ComponentId {
        self.base.id()
    }

    fn init(&mut self, phase: u32, ctx: &mut SimContext<'_>) -> SimResult<bool> {
        if phase == 0 {
            if let Some(out) = ctx.out_link(self.base.id(), "out") {
                ctx.send_init_data(out, serde_json::json!(self.data))?;
            }
        }
        Ok(false)
    }
}

/// Drains init-phase data arriving on its `in` link and records the
/// phase each event was observed in.
pub struct InitProbe {
    base: BaseComponent,
    /// (phase, payload) pairs in arrival order.
    pub received: Arc<Mutex<Vec<(u32, serde_json::Value)>>>,
}

impl InitProbe {
    pub fn new(id: ComponentId) -> Self {
        Self {
            base: BaseComponent::new(id, "init-probe"),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_received(mut self, received: Arc<Mutex<Vec<(u32, serde_json::Value)>>>) -> Self {
        self.received = received;
        self
    }
}

impl Component for InitProbe {
    fn id(&self) -> ComponentId {
        self.base.id()
    }

    fn init(&mut self, phase: u32, ctx: &mut SimContext<'_>) -> SimResult<bool> {
        if let Some(input) = ctx.in_link(self.base.id(), "in") {
            while let Some(event) = ctx.recv_init_data(input)? {
                self.received.lock().push((phase, event.payload));
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::registry::ComponentRegistry;
    use crate::simulation::Simulation;

    #[test]
    fn test_counter_from_params_rejects_bad_period() {
        let mut params = Params::new();
        params.insert("clock_period", "soon");
        let err = Counter::from_params(ComponentId::component(0), &params).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParam { .. }));
    }

    #[test]
    fn test_generator_requires_period_for_clocked_emission() {
        let mut params = Params::new();
        params.insert("count", "3");
        let err = Generator::from_params(ComponentId::component(0), &params).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParam { .. }));
    }

    #[test]
    fn test_clocked_generator_feeds_relay() {
        let config = SimConfig::from_yaml(
            r#"
components:
  - name: gen
    type: Generator
    params:
      count: "3"
      period: "10"
  - name: sink
    type: Relay
links:
  - name: wire
    from: gen.out
    to: sink.in
    latency: 5
"#,
        )
        .unwrap();

        let received = Arc::new(AtomicU64::new(0));
        let log: CycleLog = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentRegistry::new();
        registry.register("Generator", |id, params| {
            Ok(Box::new(Generator::from_params(id, params)?))
        });
        {
            let received = received.clone();
            let log = log.clone();
            registry.register("Relay", move |id, params| {
                Ok(Box::new(
                    Relay::from_params(id, params)?
                        .with_received_counter(received.clone())
                        .with_log(log.clone()),
                ))
            });
        }

        let mut sim = Simulation::build(&config, &registry, None).unwrap();
        sim.run().unwrap();

        // Emissions at 10, 20, 30 with latency 5
        assert_eq!(received.load(Ordering::Relaxed), 3);
        assert_eq!(*log.lock(), vec![15, 25, 35]);
        assert_eq!(sim.current_cycle(), 35);
    }

    #[test]
    fn test_relay_routes_tap_port_to_subcomponent() {
        let config = SimConfig::from_yaml(
            r#"
components:
  - name: gen
    type: Generator
    params:
      start: "0"
  - name: sink
    type: Relay
links:
  - name: tapline
    from: gen.out
    to: sink.tap
    latency: 5
"#,
        )
        .unwrap();

        let tap_seen = Arc::new(AtomicU64::new(0));
        let received = Arc::new(AtomicU64::new(0));
        let mut registry = ComponentRegistry::new();
        registry.register("Generator", |id, params| {
            Ok(Box::new(Generator::from_params(id, params)?))
        });
        {
            let tap_seen = tap_seen.clone();
            let received = received.clone();
            registry.register("Relay", move |id, params| {
                Ok(Box::new(
                    Relay::from_params(id, params)?
                        .with_tap_counter(tap_seen.clone())
                        .with_received_counter(received.clone()),
                ))
            });
        }

        let mut sim = Simulation::build(&config, &registry, None).unwrap();
        sim.run().unwrap();

        // The tap saw the event; the main port did not.
        assert_eq!(tap_seen.load(Ordering::Relaxed), 1);
        assert_eq!(received.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_local_init_data_moves_before_setup() {
        let config = SimConfig::from_yaml(
            r#"
components:
  - name: boot
    type: InitSender
    params:
      data: "topology"
  - name: probe
    type: InitProbe
links:
  - name: bootline
    from: boot.out
    to: probe.in
"#,
        )
        .unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentRegistry::new();
        registry.register("InitSender", |id, params| {
            Ok(Box::new(InitSender::from_params(id, params)?))
        });
        {
            let received = received.clone();
            registry.register("InitProbe", move |id, _| {
                Ok(Box::new(InitProbe::new(id).with_received(received.clone())))
            });
        }

        let mut sim = Simulation::build(&config, &registry, None).unwrap();
        sim.run().unwrap();

        let got = received.lock();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].1, serde_json::json!("topology"));
        // No init events remain queued anywhere.
        assert!(sim.links().iter().all(|l| l.init_recv.is_empty()));
    }
}
