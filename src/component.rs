//! Components and sub-components: the user-facing simulation entities.
//!
//! A component is a state machine the scheduler drives through a fixed
//! lifecycle: repeated `init` phases until every component is satisfied,
//! one `setup`, event and clock dispatch during the main loop, and one
//! `finish`. Sub-components are owned children sharing the parent's
//! identity domain; the kernel dispatches to the owning component and
//! the parent routes inward.

use crate::activity::Event;
use crate::error::SimResult;
use crate::link::Handler;
use crate::simulation::SimContext;
use crate::types::{ComponentId, LinkId, SimTime};

/// The contract every top-level simulation component implements.
///
/// All methods receive the per-rank [`SimContext`] for sending events,
/// draining polling queues, registering clocks, and ending the
/// simulation. Handler failures propagate out of the main loop and
/// terminate the rank.
pub trait Component: Send {
    /// The component's identity within the simulation.
    fn id(&self) -> ComponentId;

    /// One untimed init phase. Return `Ok(true)` to request another
    /// phase; phases continue until no component on any rank asks for
    /// more and no init data is in flight.
    fn init(&mut self, _phase: u32, _ctx: &mut SimContext<'_>) -> SimResult<bool> {
        Ok(false)
    }

    /// Called exactly once after init completes, before the main loop.
    fn setup(&mut self, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }

    /// An event arrived on one of this component's links. The handler
    /// names the receiving entity and port; events for sub-components
    /// arrive here and are routed inward by id.
    fn on_event(&mut self, _handler: &Handler, _event: Event, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }

    /// A registered clock fired at `cycle`. Return `Ok(true)` to keep
    /// the clock ticking, `Ok(false)` to cancel it.
    fn on_clock(&mut self, _cycle: SimTime, _ctx: &mut SimContext<'_>) -> SimResult<bool> {
        Ok(false)
    }

    /// Called exactly once after the main loop exits.
    fn finish(&mut self, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }
}

/// The contract of an owned sub-component.
///
/// Sub-components never receive clocks directly and may not terminate a
/// cross-rank link; they participate through the parent's link
/// namespace.
pub trait SubComponent: Send {
    /// The sub-component's identity (parent bits plus sub index).
    fn id(&self) -> ComponentId;

    /// One untimed init phase, mirroring [`Component::init`].
    fn init(&mut self, _phase: u32, _ctx: &mut SimContext<'_>) -> SimResult<bool> {
        Ok(false)
    }

    /// Called once before the main loop.
    fn setup(&mut self, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }

    /// An event routed inward by the parent.
    fn on_event(&mut self, _handler: &Handler, _event: Event, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }

    /// Called once after the main loop.
    fn finish(&mut self, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }
}

/// Identity and link bookkeeping shared by component implementations.
///
/// Implementations embed a `BaseComponent` rather than inheriting from
/// it; it tracks the owned links and allocates sub-component ids inside
/// the parent's identity domain.
///
/// Two construction paths exist for sub-component bases:
///
/// - [`BaseComponent::for_subcomponent`] takes an explicit id handed out
///   by the loader (the forward-only path);
/// - [`BaseComponent::for_legacy_subcomponent`] takes the parent and
///   inherits whatever sub-component id the parent is currently loading,
///   marking the base as legacy-loaded. Runtime semantics are identical;
///   the flag only records how the entity was built.
#[derive(Clone, Debug)]
pub struct BaseComponent {
    id: ComponentId,
    name: String,
    links: Vec<LinkId>,
    next_sub_index: u32,
    currently_loading_sub: Option<ComponentId>,
    legacy_api: bool,
}

impl BaseComponent {
    /// Creates the base of a top-level component.
    pub fn new(id: ComponentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            links: Vec::new(),
            next_sub_index: 1,
            currently_loading_sub: None,
            legacy_api: false,
        }
    }

    /// Creates a sub-component base from an explicit id.
    pub fn for_subcomponent(id: ComponentId, name: impl Into<String>) -> Self {
        debug_assert!(id.is_subcomponent());
        Self {
            id,
            name: name.into(),
            links: Vec::new(),
            next_sub_index: 1,
            currently_loading_sub: None,
            legacy_api: false,
        }
    }

    /// Creates a sub-component base from the parent, inheriting the
    /// parent's currently-loading sub-component id (allocating one if
    /// the parent has none in flight). Sets the legacy flag.
    pub fn for_legacy_subcomponent(parent: &mut BaseComponent, name: impl Into<String>) -> Self {
        let id = match parent.currently_loading_sub {
            Some(id) => id,
            None => parent.next_subcomponent_id(),
        };
        let mut base = Self::for_subcomponent(id, name);
        base.legacy_api = true;
        base
    }

    /// The entity's identity.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The configuration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records ownership of a link.
    pub fn attach_link(&mut self, link: LinkId) {
        self.links.push(link);
    }

    /// The links owned by this entity, in attachment order.
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Allocates the id for the next owned sub-component and remembers
    /// it as the currently-loading one, which the legacy construction
    /// path reads back.
    pub fn next_subcomponent_id(&mut self) -> ComponentId {
        let id = self.id.parent().subcomponent(self.next_sub_index);
        self.next_sub_index += 1;
        self.currently_loading_sub = Some(id);
        id
    }

    /// The id of the sub-component currently being loaded, if any.
    pub fn currently_loading_subcomponent(&self) -> Option<ComponentId> {
        self.currently_loading_sub
    }

    /// Returns true if this base was built through the legacy
    /// parent-pointer path.
    pub fn loaded_with_legacy_api(&self) -> bool {
        self.legacy_api
    }
}
