//! Multi-rank execution inside one process.
//!
//! The [`ParallelRunner`] builds one [`Simulation`] per configured rank
//! over an in-process transport mesh and runs them to completion on a
//! rayon thread pool sized to the rank count. Each rank blocks inside
//! its own barrier executions, so the pool is sized exactly: every rank
//! owns a thread for the whole run.
//!
//! # Feature Flag
//!
//! This module requires the `parallel` feature (enabled by default):
//! ```toml
//! [dependencies]
//! maelstrom = { version = "0.1", features = ["parallel"] }
//! ```

use parking_lot::Mutex;

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::registry::ComponentRegistry;
use crate::simulation::Simulation;
use crate::stats::KernelStats;
use crate::transport::{ChannelTransport, Transport};
use crate::types::{Rank, SimTime};

/// Outcome of one rank's run.
#[derive(Clone, Debug)]
pub struct RankReport {
    /// The rank's index.
    pub rank: Rank,
    /// Simulated cycle at which the rank stopped.
    pub final_cycle: SimTime,
    /// The rank's kernel counters.
    pub stats: KernelStats,
}

/// Runs a partitioned configuration with one thread per rank.
pub struct ParallelRunner {
    config: SimConfig,
    registry: ComponentRegistry,
}

impl ParallelRunner {
    /// Creates a runner over a configuration and factory registry.
    pub fn new(config: SimConfig, registry: ComponentRegistry) -> Self {
        Self { config, registry }
    }

    /// Number of ranks the configuration partitions onto.
    pub fn num_ranks(&self) -> u32 {
        self.config.num_ranks()
    }

    /// Runs every rank to completion and returns per-rank reports in
    /// rank order. The first rank failure aborts the job: its transport
    /// drops, peers fail their next exchange, and everyone unwinds.
    pub fn run(&self) -> SimResult<Vec<RankReport>> {
        let n = self.num_ranks();
        if n <= 1 {
            let mut sim = Simulation::build(&self.config, &self.registry, None)?;
            sim.run()?;
            return Ok(vec![RankReport {
                rank: 0,
                final_cycle: sim.current_cycle(),
                stats: sim.stats().clone(),
            }]);
        }

        let transports = ChannelTransport::mesh(n);
        let results: Mutex<Vec<(Rank, SimResult<RankReport>)>> = Mutex::new(Vec::new());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n as usize)
            .build()
            .map_err(|e| SimError::Transport(format!("thread pool: {e}")))?;

        pool.scope(|scope| {
            for transport in transports {
                let rank = transport.rank();
                let config = &self.config;
                let registry = &self.registry;
                let results = &results;
                scope.spawn(move |_| {
                    let outcome = (|| {
                        let mut sim =
                            Simulation::build(config, registry, Some(Box::new(transport)))?;
                        sim.run()?;
                        Ok(RankReport {
                            rank,
                            final_cycle: sim.current_cycle(),
                            stats: sim.stats().clone(),
                        })
                    })();
                    results.lock().push((rank, outcome));
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(rank, _)| *rank);

        let mut reports = Vec::with_capacity(results.len());
        for (_, outcome) in results {
            reports.push(outcome?);
        }
        Ok(reports)
    }

    /// Runs every rank and merges the kernel counters into one summary.
    pub fn run_merged(&self) -> SimResult<KernelStats> {
        let reports = self.run()?;
        let mut merged = KernelStats::new();
        for report in &reports {
            merged.merge(&report.stats);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_default_registry;

    #[test]
    fn test_single_rank_fallback() {
        let config = SimConfig::from_yaml(
            r#"
simulation:
  stop_time: 100
components:
  - name: c0
    type: Counter
"#,
        )
        .unwrap();

        let runner = ParallelRunner::new(config, create_default_registry());
        assert_eq!(runner.num_ranks(), 1);

        let reports = runner.run().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].final_cycle, 100);
    }

    #[test]
    fn test_two_rank_run_reaches_stop_time() {
        let config = SimConfig::from_yaml(
            r#"
simulation:
  stop_time: 500
  lookahead: 100
components:
  - name: a
    type: Counter
    rank: 0
  - name: b
    type: Counter
    rank: 1
links:
  - name: ab
    from: a.out
    to: b.in
    latency: 100
"#,
        )
        .unwrap();

        let runner = ParallelRunner::new(config, create_default_registry());
        let reports = runner.run().unwrap();

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert_eq!(report.final_cycle, 500);
            // Barriers at 100..500 inclusive of the window that closes at
            // the stop cycle: the marker fires after the 500 barrier.
            assert_eq!(report.stats.sync_rounds, 5);
        }
    }
}
