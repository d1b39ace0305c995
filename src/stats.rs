//! Kernel statistics collection and export.
//!
//! Counters cover the scheduler itself: activities executed, events
//! moved locally and across ranks, clock ticks, barrier rounds, and the
//! deepest the vortex got. Model-level statistics belong to components
//! and their own output sinks, not here.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Counters for one rank's kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStats {
    /// Activities popped and executed by the main loop
    pub activities_executed: u64,
    /// Events sent on links (local and remote)
    pub events_sent: u64,
    /// Events delivered to handlers
    pub events_delivered: u64,
    /// Clock handler invocations
    pub clock_ticks: u64,
    /// Barrier exchanges completed
    pub sync_rounds: u64,
    /// Events shipped to peer ranks
    pub remote_events_sent: u64,
    /// Events received from peer ranks
    pub remote_events_received: u64,
    /// Init-phase data events moved
    pub init_events_sent: u64,
    /// Deepest observed time vortex
    pub max_vortex_depth: usize,
}

impl KernelStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a vortex depth observation.
    #[inline]
    pub fn observe_depth(&mut self, depth: usize) {
        if depth > self.max_vortex_depth {
            self.max_vortex_depth = depth;
        }
    }

    /// Accumulates another rank's counters into this one.
    pub fn merge(&mut self, other: &KernelStats) {
        self.activities_executed += other.activities_executed;
        self.events_sent += other.events_sent;
        self.events_delivered += other.events_delivered;
        self.clock_ticks += other.clock_ticks;
        self.sync_rounds += other.sync_rounds;
        self.remote_events_sent += other.remote_events_sent;
        self.remote_events_received += other.remote_events_received;
        self.init_events_sent += other.init_events_sent;
        self.max_vortex_depth = self.max_vortex_depth.max(other.max_vortex_depth);
    }

    /// Exports the counters as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "activities_executed": self.activities_executed,
            "events_sent": self.events_sent,
            "events_delivered": self.events_delivered,
            "clock_ticks": self.clock_ticks,
            "sync_rounds": self.sync_rounds,
            "remote_events_sent": self.remote_events_sent,
            "remote_events_received": self.remote_events_received,
            "init_events_sent": self.init_events_sent,
            "max_vortex_depth": self.max_vortex_depth,
        })
    }

    /// Writes the counters to a JSON file.
    pub fn write_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.write_all(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_depth_keeps_maximum() {
        let mut stats = KernelStats::new();
        stats.observe_depth(3);
        stats.observe_depth(9);
        stats.observe_depth(5);
        assert_eq!(stats.max_vortex_depth, 9);
    }

    #[test]
    fn test_merge() {
        let mut a = KernelStats {
            activities_executed: 10,
            events_delivered: 4,
            max_vortex_depth: 2,
            ..Default::default()
        };
        let b = KernelStats {
            activities_executed: 5,
            events_delivered: 1,
            max_vortex_depth: 7,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.activities_executed, 15);
        assert_eq!(a.events_delivered, 5);
        assert_eq!(a.max_vortex_depth, 7);
    }

    #[test]
    fn test_json_export() {
        let stats = KernelStats {
            sync_rounds: 3,
            ..Default::default()
        };
        let json = stats.to_json();
        assert_eq!(json["sync_rounds"], 3);
        let back: KernelStats = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }
}
