//! Configuration system for the simulation kernel.
//!
//! This module provides YAML/JSON configuration file support for
//! defining a partitioned simulation declaratively.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   stop_time: 1000
//!   lookahead: 100
//!
//! components:
//!   - name: gen0
//!     type: Generator
//!     rank: 0
//!     params:
//!       start: "0"
//!   - name: sink0
//!     type: Relay
//!     rank: 1
//!
//! links:
//!   - name: wire
//!     from: gen0.out
//!     to: sink0.in
//!     latency: 100
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::Params;
use crate::types::{Rank, SimTime};

/// Errors that can occur while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown file format: {0}")]
    UnknownFormat(String),

    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    #[error("missing required parameter `{key}`")]
    MissingParam { key: String },

    #[error("parameter `{key}` has invalid value `{value}`: {reason}")]
    InvalidParam {
        key: String,
        value: String,
        reason: String,
    },

    #[error("duplicate link name: {0}")]
    DuplicateLink(String),

    #[error(
        "link `{link}` crosses ranks with latency {latency} below the lookahead period {period}"
    )]
    LookaheadViolation {
        link: String,
        latency: SimTime,
        period: SimTime,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Cycle at which the end-of-simulation marker fires. Required for
    /// multi-rank runs (the barrier keeps the queue non-empty forever).
    #[serde(default)]
    pub stop_time: Option<SimTime>,

    /// Barrier period and minimum cross-rank link latency, in cycles.
    #[serde(default = "default_lookahead")]
    pub lookahead: SimTime,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_lookahead() -> SimTime {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            stop_time: None,
            lookahead: default_lookahead(),
            log_level: default_log_level(),
        }
    }
}

/// Configuration for a single component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Unique component name
    pub name: String,

    /// Component type, resolved against the factory registry
    #[serde(rename = "type")]
    pub component_type: String,

    /// The rank this component is partitioned onto
    #[serde(default)]
    pub rank: Rank,

    /// Construction parameters passed to the factory
    #[serde(default)]
    pub params: Params,
}

/// Configuration for a link between two component ports.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Unique link name, used in diagnostics
    pub name: String,

    /// Sender endpoint as `component.port`
    pub from: String,

    /// Recipient endpoint as `component.port`
    pub to: String,

    /// Minimum delivery latency in cycles
    #[serde(default)]
    pub latency: SimTime,

    /// Use polling delivery instead of handler dispatch
    #[serde(default)]
    pub polling: bool,
}

impl LinkConfig {
    /// Splits the sender endpoint into (component, port).
    pub fn from_endpoint(&self) -> ConfigResult<(&str, &str)> {
        split_endpoint(&self.name, &self.from)
    }

    /// Splits the recipient endpoint into (component, port).
    pub fn to_endpoint(&self) -> ConfigResult<(&str, &str)> {
        split_endpoint(&self.name, &self.to)
    }
}

fn split_endpoint<'a>(link: &str, endpoint: &'a str) -> ConfigResult<(&'a str, &'a str)> {
    endpoint.split_once('.').ok_or_else(|| {
        ConfigError::Validation(format!(
            "link `{link}` endpoint `{endpoint}` is not of the form component.port"
        ))
    })
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Component definitions
    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    /// Link definitions
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl SimConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The dense index of a component by name.
    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.name == name)
    }

    /// Finds a component configuration by name.
    pub fn find_component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Finds a link configuration by name.
    pub fn find_link(&self, name: &str) -> Option<&LinkConfig> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Number of ranks the configuration partitions onto.
    pub fn num_ranks(&self) -> u32 {
        self.components
            .iter()
            .map(|c| c.rank + 1)
            .max()
            .unwrap_or(1)
            .max(1) as u32
    }

    /// Returns true if components span more than one rank.
    pub fn is_multi_rank(&self) -> bool {
        self.num_ranks() > 1
    }

    /// Validates the entire configuration.
    ///
    /// Checks component and link name uniqueness, endpoint resolution,
    /// rank sanity, and the lookahead invariant: every cross-rank link
    /// must have latency at least the barrier period, and a multi-rank
    /// run must have a stop time.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut component_names = HashSet::new();
        for c in &self.components {
            if !component_names.insert(c.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate component name: {}",
                    c.name
                )));
            }
            if c.rank < 0 {
                return Err(ConfigError::Validation(format!(
                    "component `{}` has negative rank {}",
                    c.name, c.rank
                )));
            }
        }

        let mut link_names = HashSet::new();
        let mut sender_endpoints = HashSet::new();
        for l in &self.links {
            if !link_names.insert(l.name.as_str()) {
                return Err(ConfigError::DuplicateLink(l.name.clone()));
            }

            let (from_comp, _) = l.from_endpoint()?;
            let (to_comp, _) = l.to_endpoint()?;

            let src = self.find_component(from_comp).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "link `{}` references unknown component `{}`",
                    l.name, from_comp
                ))
            })?;
            let dst = self.find_component(to_comp).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "link `{}` references unknown component `{}`",
                    l.name, to_comp
                ))
            })?;

            if !sender_endpoints.insert(l.from.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "sender endpoint `{}` is used by more than one link",
                    l.from
                )));
            }

            if src.rank != dst.rank {
                if l.polling {
                    return Err(ConfigError::Validation(format!(
                        "link `{}` crosses ranks and cannot use polling delivery",
                        l.name
                    )));
                }
                if l.latency < self.simulation.lookahead || l.latency == 0 {
                    return Err(ConfigError::LookaheadViolation {
                        link: l.name.clone(),
                        latency: l.latency,
                        period: self.simulation.lookahead,
                    });
                }
            }
        }

        if self.is_multi_rank() {
            if self.simulation.lookahead == 0 {
                return Err(ConfigError::Validation(
                    "multi-rank simulation requires a positive lookahead".to_string(),
                ));
            }
            if self.simulation.stop_time.is_none() {
                return Err(ConfigError::Validation(
                    "multi-rank simulation requires a stop_time".to_string(),
                ));
            }
        } else if self.simulation.stop_time.is_none() && !self.links.is_empty() {
            tracing::debug!("single-rank configuration without stop_time; will run to quiescence");
        }

        Ok(())
    }
}
