//! Logical time for ordering membership facts
//!
//! Values come from the sender's monotonically increasing clock and are only
//! ever compared here. They bear no relation to wall-clock time.

use serde::{Deserialize, Serialize};

/// Causal timestamp carried by every membership fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalTime(pub u64);

impl LogicalTime {
    /// No information yet.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw counter value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw counter value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the zero value
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for LogicalTime {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
