//! Activities: the schedulable units of the simulation.
//!
//! Everything the main loop executes is an [`Activity`]: user events
//! traversing links, clock ticks, the cross-rank barrier, and the
//! end-of-simulation marker. Activities are ordered by
//! (delivery time, priority, id); the id tie-break makes the order total
//! and reproducible.

use serde::{Deserialize, Serialize};

use crate::types::{
    ActivityId, ComponentId, LinkId, Priority, SimTime, CLOCK_PRIORITY, DEFAULT_PRIORITY, NO_LINK,
    STOP_PRIORITY, SYNC_PRIORITY,
};

/// A user event traversing a link.
///
/// The payload is an opaque JSON value; the kernel never interprets it.
/// The `link_id` is stamped by the link on send and identifies the
/// receiving link on delivery (including after a cross-rank hop).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The link this event traverses; [`NO_LINK`] until stamped.
    pub link_id: LinkId,
    /// Opaque user payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// Creates an event with an unstamped link id.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            link_id: NO_LINK,
            payload,
        }
    }

    /// Creates an event already stamped with a link id.
    pub fn on_link(link_id: LinkId, payload: serde_json::Value) -> Self {
        Self { link_id, payload }
    }
}

/// What an activity does when the main loop executes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActivityKind {
    /// Deliver an event to the handler registered on its link.
    Event(Event),
    /// Invoke a component's clock handler; re-inserted at `+period`
    /// while the handler asks to keep ticking.
    Clock {
        /// The component whose clock handler fires.
        component: ComponentId,
        /// Tick period in core cycles.
        period: SimTime,
    },
    /// Run the cross-rank barrier exchange.
    SyncBarrier,
    /// Stop the main loop at this cycle.
    Stop,
}

/// A schedulable unit with its full ordering key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Absolute cycle at which this activity executes. Immutable once
    /// the activity is inserted into a queue.
    pub time: SimTime,
    /// Lower values fire first at equal times.
    pub priority: Priority,
    /// Per-rank monotonic id; the final tie-break.
    pub id: ActivityId,
    /// What to do on execution.
    pub kind: ActivityKind,
}

impl Activity {
    /// A user event at the default priority.
    pub fn event(time: SimTime, id: ActivityId, event: Event) -> Self {
        Self {
            time,
            priority: DEFAULT_PRIORITY,
            id,
            kind: ActivityKind::Event(event),
        }
    }

    /// A clock tick for `component` with the given period.
    pub fn clock(time: SimTime, id: ActivityId, component: ComponentId, period: SimTime) -> Self {
        Self {
            time,
            priority: CLOCK_PRIORITY,
            id,
            kind: ActivityKind::Clock { component, period },
        }
    }

    /// The barrier action at its fixed priority.
    pub fn sync(time: SimTime, id: ActivityId) -> Self {
        Self {
            time,
            priority: SYNC_PRIORITY,
            id,
            kind: ActivityKind::SyncBarrier,
        }
    }

    /// The end-of-simulation marker (sentinel priority, fires last at
    /// its cycle).
    pub fn stop(time: SimTime, id: ActivityId) -> Self {
        Self {
            time,
            priority: STOP_PRIORITY,
            id,
            kind: ActivityKind::Stop,
        }
    }

    /// Overrides the priority (used when re-injecting remote events that
    /// were sent at a non-default priority).
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The (time, priority, id) ordering key used by the time vortex.
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            time: self.time,
            priority: self.priority,
            id: self.id,
        }
    }

    /// The (time, id) ordering key used by polling queues, where
    /// priorities are irrelevant.
    pub fn poll_key(&self) -> PollKey {
        PollKey {
            time: self.time,
            id: self.id,
        }
    }
}

/// Total order over (delivery time, priority, id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub time: SimTime,
    pub priority: Priority,
    pub id: ActivityId,
}

/// Total order over (delivery time, id), ignoring priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollKey {
    pub time: SimTime,
    pub id: ActivityId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_key_breaks_ties_on_priority_then_id() {
        let a = Activity::event(10, 7, Event::new(serde_json::json!(1))).with_priority(5);
        let b = Activity::event(10, 8, Event::new(serde_json::json!(2))).with_priority(3);
        let c = Activity::event(10, 9, Event::new(serde_json::json!(3))).with_priority(5);

        // Same time: lower priority first, then lower id
        assert!(b.order_key() < a.order_key());
        assert!(a.order_key() < c.order_key());
    }

    #[test]
    fn test_time_dominates_priority() {
        let early = Activity::stop(5, 0);
        let late = Activity::event(6, 1, Event::new(serde_json::json!(null)));
        assert!(early.order_key() < late.order_key());
    }

    #[test]
    fn test_poll_key_ignores_priority() {
        let a = Activity::event(10, 1, Event::new(serde_json::json!(1))).with_priority(99);
        let b = Activity::event(10, 2, Event::new(serde_json::json!(2))).with_priority(0);
        assert!(a.poll_key() < b.poll_key());
    }

    #[test]
    fn test_kernel_activity_priorities() {
        // At equal cycles: events, then the barrier, then clocks, then
        // the stop marker.
        let ev = Activity::event(100, 0, Event::new(serde_json::json!(null)));
        let sync = Activity::sync(100, 1);
        let clock = Activity::clock(100, 2, crate::types::ComponentId::component(0), 10);
        let stop = Activity::stop(100, 3);

        assert!(ev.order_key() < sync.order_key());
        assert!(sync.order_key() < clock.order_key());
        assert!(clock.order_key() < stop.order_key());
    }

    #[test]
    fn test_event_serialization() {
        let ev = Event::on_link(3, serde_json::json!({"seq": 1}));
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}
