//! Run-time error types for the simulation kernel.
//!
//! The engine prefers loud, immediate abort over silent divergence:
//! every error here terminates the rank's run. Setup-time problems are
//! reported separately as [`ConfigError`](crate::config::ConfigError)
//! before the simulation starts.

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::LinkId;

/// Fatal run-time failures of a rank.
#[derive(Error, Debug)]
pub enum SimError {
    /// An activity or event was observed behind the current cycle, or a
    /// remote event undercut its link's latency floor.
    #[error("causality violation: {0}")]
    Causality(String),

    /// A send or event referenced a link id with no registry entry.
    #[error("link {0} is not registered on this rank")]
    UnknownLink(LinkId),

    /// An inbound sync event named a link id absent from the barrier's
    /// link map. Cannot arise in a correct configuration.
    #[error("no cross-rank link {link_id} registered for inbound sync event")]
    UnknownRemoteLink { link_id: LinkId },

    /// A peer-to-peer transfer failed; the job aborts.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A component's handler failed; the failure propagates out of the
    /// main loop.
    #[error("component `{component}` failed: {reason}")]
    Component { component: String, reason: String },

    /// A kernel API was called in the wrong lifecycle phase (for
    /// example, a timed send during the init phase).
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),

    /// A setup failure surfaced while building or restoring a rank.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for fallible kernel operations.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_link() {
        let e = SimError::UnknownRemoteLink { link_id: 12 };
        assert!(e.to_string().contains("12"));
    }

    #[test]
    fn test_config_error_converts() {
        let c = ConfigError::Validation("bad".into());
        let e: SimError = c.into();
        assert!(matches!(e, SimError::Config(_)));
    }

    #[test]
    fn test_component_error_display() {
        let e = SimError::Component {
            component: "dram0".into(),
            reason: "bad request".into(),
        };
        assert_eq!(e.to_string(), "component `dram0` failed: bad request");
    }
}
