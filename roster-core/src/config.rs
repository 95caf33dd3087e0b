//! Membership engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_GONE_TIMEOUT_SECS: u64 = 24 * 60 * 60;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15;

/// Timeouts for the status registry and ordering gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// How long a left or failed member is remembered (in seconds)
    pub gone_timeout_secs: u64,
    /// How long an accepted fact is remembered after receipt (in seconds)
    pub operation_timeout_secs: u64,
    /// Interval between cleanup sweeps (in seconds)
    pub sweep_interval_secs: u64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            gone_timeout_secs: DEFAULT_GONE_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl MembershipConfig {
    /// Grace period for gone members
    pub fn gone_timeout(&self) -> Duration {
        Duration::from_secs(self.gone_timeout_secs)
    }

    /// Retention of ordering gate slots
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Cadence of the background sweep
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.gone_timeout_secs == 0 {
            return Err(Error::InvalidConfig("gone_timeout_secs must be non-zero"));
        }
        if self.operation_timeout_secs == 0 {
            return Err(Error::InvalidConfig("operation_timeout_secs must be non-zero"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::InvalidConfig("sweep_interval_secs must be non-zero"));
        }
        Ok(())
    }
}
