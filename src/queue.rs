//! Ordered activity queues.
//!
//! Two queues share the [`ActivityQueue`] contract: the [`TimeVortex`],
//! the rank's single source of what to execute next, ordered by
//! (time, priority, id); and the [`PollingLinkQueue`], which holds events
//! for polling-mode links ordered by (time, id) until the owning
//! component drains them.
//!
//! Ownership transfers with the activity: inserting moves it into the
//! queue, popping moves it back out. Because the activity id participates
//! in every key, duplicate (time, priority) pairs never collide; inserting
//! the *same* activity twice is a bug and trips a debug assertion.

use std::collections::BTreeMap;

use crate::activity::{Activity, ActivityKind, Event, OrderKey, PollKey};
use crate::types::SimTime;

/// Common contract of the ordered activity queues.
pub trait ActivityQueue {
    /// Returns true if the queue holds no activities.
    fn is_empty(&self) -> bool;

    /// Number of queued activities.
    fn len(&self) -> usize;

    /// Inserts an activity, transferring ownership to the queue.
    fn insert(&mut self, activity: Activity);

    /// Removes and returns the earliest activity, or `None` when empty.
    fn pop(&mut self) -> Option<Activity>;

    /// Returns the earliest activity without removing it.
    fn front(&self) -> Option<&Activity>;
}

/// The rank's primary priority queue over activities.
///
/// Ordered by (delivery time, priority, id). For a deterministic stream
/// of inserts the pop sequence is deterministic, which the engine relies
/// on for cross-run reproducibility.
#[derive(Debug, Default)]
pub struct TimeVortex {
    data: BTreeMap<OrderKey, Activity>,
}

impl TimeVortex {
    /// Creates an empty vortex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates activities in pop order (used by checkpointing).
    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.data.values()
    }

    /// Removes every queued activity.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl ActivityQueue for TimeVortex {
    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn insert(&mut self, activity: Activity) {
        let prev = self.data.insert(activity.order_key(), activity);
        debug_assert!(prev.is_none(), "activity already present in time vortex");
    }

    fn pop(&mut self) -> Option<Activity> {
        self.data.pop_first().map(|(_, a)| a)
    }

    fn front(&self) -> Option<&Activity> {
        self.data.first_key_value().map(|(_, a)| a)
    }
}

/// Secondary queue for polling-mode links.
///
/// Ordered by (delivery time, id) alone. The main loop never pops from
/// it; the owning component drains ready events itself, typically from a
/// clock handler.
#[derive(Debug, Default)]
pub struct PollingLinkQueue {
    data: BTreeMap<PollKey, Activity>,
}

impl PollingLinkQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every event with delivery time at or before
    /// `cycle`, in (time, id) order.
    pub fn drain_ready(&mut self, cycle: SimTime) -> Vec<(SimTime, Event)> {
        let boundary = PollKey {
            time: cycle.saturating_add(1),
            id: 0,
        };
        let later = self.data.split_off(&boundary);
        let ready = std::mem::replace(&mut self.data, later);
        ready
            .into_values()
            .filter_map(|a| match a.kind {
                ActivityKind::Event(ev) => Some((a.time, ev)),
                _ => None,
            })
            .collect()
    }

    /// Iterates queued activities in (time, id) order.
    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.data.values()
    }
}

impl ActivityQueue for PollingLinkQueue {
    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn insert(&mut self, activity: Activity) {
        let prev = self.data.insert(activity.poll_key(), activity);
        debug_assert!(prev.is_none(), "activity already present in polling queue");
    }

    fn pop(&mut self) -> Option<Activity> {
        self.data.pop_first().map(|(_, a)| a)
    }

    fn front(&self) -> Option<&Activity> {
        self.data.first_key_value().map(|(_, a)| a)
    }
}
