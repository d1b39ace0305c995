//! # Maelstrom PDES Kernel
//!
//! A parallel discrete-event simulation kernel: time-ordered event
//! delivery within a rank, conservative lookahead synchronization
//! between ranks.
//!
//! ## Design Principles
//!
//! - **One queue per rank**: every schedulable unit is an [`Activity`]
//!   in the rank's [`TimeVortex`], popped in (time, priority, id) order.
//!   The id tie-break makes runs reproducible.
//! - **Links carry the timing**: components exchange events over typed
//!   [`Link`]s that apply a latency floor; delivery is a handler
//!   invocation (push) or a polling-queue drain (pull).
//! - **Windowed synchronization**: ranks exchange batched remote events
//!   once per lookahead window through a barrier [`Sync`](crate::sync::Sync);
//!   because no cross-rank link may undercut the window, one exchange
//!   per window preserves causality.
//! - **Explicit context**: there is no global simulation singleton;
//!   handlers receive a [`SimContext`] borrowed from their rank's
//!   [`Simulation`].

pub mod activity;
pub mod checkpoint;
pub mod component;
pub mod components;
pub mod config;
pub mod error;
pub mod link;
pub mod params;
#[cfg(feature = "parallel")]
pub mod parallel;
pub mod queue;
pub mod registry;
pub mod simulation;
pub mod stats;
pub mod sync;
pub mod time;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use activity::{Activity, ActivityKind, Event};
pub use checkpoint::Checkpoint;
pub use component::{BaseComponent, Component, SubComponent};
pub use config::{ConfigError, SimConfig};
pub use error::{SimError, SimResult};
pub use link::{Delivery, Handler, Link, LinkRegistry};
#[cfg(feature = "parallel")]
pub use parallel::{ParallelRunner, RankReport};
pub use params::Params;
pub use queue::{ActivityQueue, PollingLinkQueue, TimeVortex};
pub use registry::{create_default_registry, ComponentRegistry};
pub use simulation::{SimContext, Simulation};
pub use stats::KernelStats;
pub use sync::{Sync, SyncQueue};
pub use time::TimeConverter;
pub use transport::{ChannelTransport, RemoteEvent, Transport};
pub use types::{ActivityId, ComponentId, LinkId, Rank, SimTime};
