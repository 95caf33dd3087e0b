//! # Roster
//!
//! **Cluster membership bookkeeping for gossip protocols.**
//!
//! Roster keeps a node's view of who is in the cluster while membership facts
//! arrive by gossip: duplicated, delayed and out of order. Every fact carries
//! a logical time, and a per-node gate drops anything not strictly newer than
//! what was already accepted. Departed members are remembered for a grace
//! window so late gossip cannot resurrect them, then evicted by a periodic
//! sweep.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use roster::prelude::*;
//!
//! let local = Member::new("node-a", "10.0.0.1".parse()?, 7946);
//! let config = RosterConfig::new(local).with_gone_timeout_secs(600);
//! let roster = Roster::new(config)?;
//!
//! let join = roster.join();
//! // gossip `join` to peers, feed their facts into `roster.observe(..)`
//! ```
//!
//! ## Feature Flags
//!
//! - `tokio-runtime` (default): spawn the periodic sweeper on Tokio
//!
//! ## Crate Structure
//!
//! - [`roster_core`]: ordering gate, status registry and the membership engine
//! - [`roster_net`]: envelopes, digests and the transport boundary
//! - [`roster_runtime`]: runtime glue and the periodic sweeper

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

// Re-export sub-crates
pub use roster_core as core;
pub use roster_net as net;
pub use roster_runtime as runtime;

// Re-export commonly used items at the top level
pub use roster_core::{
    clock::LogicalTime,
    config::MembershipConfig,
    member::{Member, MemberState, ProtocolRange},
    membership::{ApplyOutcome, MemberFact, Membership, SweepReport},
    operation::MessageKind,
    status::MemberStatus,
    Error, Result,
};

pub use roster_net::{
    gossip::{GossipHandler, Inbound},
    protocol::{Frame, MemberMessage, MembershipDigest},
    traits::GossipTransport,
};

/// For implementing [`GossipTransport`] without depending on `async-trait`
pub use async_trait::async_trait;

pub mod logging;

/// Prelude module for convenient imports
///
/// ```rust,ignore
/// use roster::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::net::prelude::*;

    pub use crate::{ConfigError, Roster, RosterConfig};
}

/// Configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document is not valid JSON or does not match the schema
    #[error("malformed roster configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// The document parsed but holds out-of-range values
    #[error(transparent)]
    Invalid(#[from] roster_core::Error),
}

/// Configuration for a Roster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Descriptor this node announces about itself
    pub local: Member,
    /// Registry and gate timeouts
    #[serde(default)]
    pub membership: MembershipConfig,
}

impl RosterConfig {
    /// Default timeouts for `local`
    pub fn new(local: Member) -> Self {
        Self {
            local,
            membership: MembershipConfig::default(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace every timeout at once
    pub fn with_membership(mut self, membership: MembershipConfig) -> Self {
        self.membership = membership;
        self
    }

    /// Set how long departed members are remembered
    pub fn with_gone_timeout_secs(mut self, secs: u64) -> Self {
        self.membership.gone_timeout_secs = secs;
        self
    }

    /// Set how long accepted facts are remembered
    pub fn with_operation_timeout_secs(mut self, secs: u64) -> Self {
        self.membership.operation_timeout_secs = secs;
        self
    }

    /// Set the interval between sweeps
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.membership.sweep_interval_secs = secs;
        self
    }

    /// Add a tag to the local descriptor
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.local = self.local.with_tag(key, value);
        self
    }

    /// Check the timeouts
    pub fn validate(&self) -> Result<()> {
        self.membership.validate()
    }
}

/// A cluster node: its own descriptor, a logical clock and the shared
/// membership engine
#[derive(Debug)]
pub struct Roster {
    local: Member,
    clock: AtomicU64,
    membership: Arc<Membership>,
}

impl Roster {
    /// Create a node from a validated configuration
    pub fn new(config: RosterConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let membership = Membership::new(config.membership)?;
        Ok(Self {
            local: config.local,
            clock: AtomicU64::new(0),
            membership: Arc::new(membership),
        })
    }

    /// Local descriptor
    pub fn local(&self) -> &Member {
        &self.local
    }

    /// Shared engine
    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    /// Current logical time
    pub fn time(&self) -> LogicalTime {
        LogicalTime::new(self.clock.load(Ordering::SeqCst))
    }

    fn tick(&self) -> LogicalTime {
        LogicalTime::new(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn announce(&self, fact: MemberFact) -> MemberFact {
        self.membership.apply(fact.clone());
        fact
    }

    /// Announce this node as joined. The returned fact is what peers should
    /// receive.
    pub fn join(&self) -> MemberFact {
        info!(member = %self.local.name, "joining cluster");
        self.announce(MemberFact::join(self.local.clone(), self.tick()))
    }

    /// Replace the local tags and announce the change
    pub fn update_tags(&mut self, tags: BTreeMap<String, String>) -> MemberFact {
        self.local.tags = tags;
        self.announce(MemberFact::update(self.local.clone(), self.tick()))
    }

    /// Announce a graceful departure
    pub fn leave(&self) -> MemberFact {
        info!(member = %self.local.name, "leaving cluster");
        self.announce(MemberFact::leave(self.local.name.clone(), self.tick()))
    }

    /// Declare a peer failed
    pub fn declare_failed(&self, name: impl Into<String>) -> MemberFact {
        self.announce(MemberFact::failed(name, self.tick()))
    }

    /// Apply a fact gossiped by a peer, advancing the local clock past it
    pub fn observe(&self, fact: MemberFact) -> ApplyOutcome {
        self.clock.fetch_max(fact.time.get(), Ordering::SeqCst);
        self.membership.apply(fact)
    }

    /// Wrap `transport` in a handler feeding this node's engine
    pub fn gossip_handler<T: GossipTransport>(&self, transport: T) -> GossipHandler<T> {
        GossipHandler::new(
            self.local.name.clone(),
            Arc::clone(&self.membership),
            transport,
        )
    }

    /// Spawn the periodic sweep on Tokio
    #[cfg(feature = "tokio-runtime")]
    pub fn spawn_sweeper(&self) -> roster_runtime::SweeperHandle {
        roster_runtime::Sweeper::from_config(
            Arc::new(roster_runtime::default_runtime()),
            Arc::clone(&self.membership),
        )
        .spawn()
    }
}
