//! Flat string parameter dictionaries for component construction.
//!
//! Factories receive a [`Params`] and pull typed values out of it;
//! missing required keys and malformed values surface as setup failures
//! rather than defaults, so a broken configuration never starts.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// A flat mapping from parameter names to string values with typed
/// accessors.
///
/// # Example
///
/// ```
/// use maelstrom::params::Params;
///
/// let mut p = Params::new();
/// p.insert("depth", "8");
///
/// let depth: u32 = p.required("depth").unwrap();
/// assert_eq!(depth, 8);
/// let width: u32 = p.optional("width", 64).unwrap();
/// assert_eq!(width, 64);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    map: BTreeMap<String, String>,
}

impl Params {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Returns true if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// The raw string value, if present.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Parses a required value; a missing key or parse failure is a
    /// setup error.
    pub fn required<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.map.get(key).ok_or_else(|| ConfigError::MissingParam {
            key: key.to_string(),
        })?;
        raw.parse().map_err(|e: T::Err| ConfigError::InvalidParam {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// Parses an optional value, falling back to `default` when the key
    /// is absent. A present-but-malformed value is still an error.
    pub fn optional<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.map.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidParam {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_present() {
        let mut p = Params::new();
        p.insert("latency", "25");
        assert_eq!(p.required::<u64>("latency").unwrap(), 25);
    }

    #[test]
    fn test_required_missing_is_error() {
        let p = Params::new();
        let err = p.required::<u64>("latency").unwrap_err();
        assert!(matches!(err, ConfigError::MissingParam { .. }));
        assert!(err.to_string().contains("latency"));
    }

    #[test]
    fn test_required_malformed_is_error() {
        let mut p = Params::new();
        p.insert("latency", "fast");
        let err = p.required::<u64>("latency").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParam { .. }));
    }

    #[test]
    fn test_optional_default_and_override() {
        let mut p = Params::new();
        p.insert("count", "3");
        assert_eq!(p.optional::<u64>("count", 1).unwrap(), 3);
        assert_eq!(p.optional::<u64>("absent", 1).unwrap(), 1);
    }

    #[test]
    fn test_optional_malformed_is_still_error() {
        let mut p = Params::new();
        p.insert("count", "three");
        assert!(p.optional::<u64>("count", 1).is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let mut p = Params::new();
        p.insert("a", "1");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"a":"1"}"#);
        let back: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
