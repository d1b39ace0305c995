//! Conversion between user time units and core cycles.

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// An immutable integer-factor mapping between a user time unit and core
/// cycles.
///
/// A converter with factor `f` maps a duration of `d` user units to
/// `d * f` core cycles; the reverse direction divides. Converters compare
/// by factor, so a coarser unit is "greater" than a finer one.
///
/// # Example
///
/// ```
/// use maelstrom::time::TimeConverter;
///
/// let ns = TimeConverter::new(10); // 10 cycles per unit
/// assert_eq!(ns.to_core_time(5), 50);
/// assert_eq!(ns.from_core_time(50), 5);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeConverter {
    factor: SimTime,
}

impl TimeConverter {
    /// Creates a converter with the given cycles-per-unit factor.
    ///
    /// The factor must be positive; configuration validation rejects
    /// zero factors before a converter is ever built.
    pub fn new(factor: SimTime) -> Self {
        debug_assert!(factor > 0, "time conversion factor must be positive");
        Self { factor }
    }

    /// The number of core cycles per user time unit.
    #[inline]
    pub fn factor(&self) -> SimTime {
        self.factor
    }

    /// Converts a duration in user units to core cycles.
    #[inline]
    pub fn to_core_time(&self, duration: SimTime) -> SimTime {
        duration * self.factor
    }

    /// Converts a cycle count back to user units (truncating).
    #[inline]
    pub fn from_core_time(&self, cycles: SimTime) -> SimTime {
        cycles / self.factor
    }
}

impl std::fmt::Display for TimeConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.factor)
    }
}
