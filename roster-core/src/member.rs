//! Member descriptors
//!
//! A [`Member`] is the identity a node picks for its process lifetime: name,
//! address, tags and the protocol versions it speaks. The liveness
//! [`MemberState`] is the only part the membership engine rewrites.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Liveness state of a member as seen locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemberState {
    /// Member is part of the cluster
    #[default]
    Alive,
    /// Member announced it is about to leave
    Leaving,
    /// Member left gracefully
    Left,
    /// Member was declared failed
    Failed,
}

impl MemberState {
    /// Whether the member has left or failed
    pub const fn is_gone(self) -> bool {
        matches!(self, Self::Left | Self::Failed)
    }

    /// Lowercase name for display and logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Leaving => "leaving",
            Self::Left => "left",
            Self::Failed => "failed",
        }
    }
}

impl core::fmt::Display for MemberState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported protocol versions advertised by a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProtocolRange {
    /// Oldest version understood
    pub min: u8,
    /// Newest version understood
    pub max: u8,
    /// Version currently spoken
    pub current: u8,
}

impl ProtocolRange {
    /// Create a version range
    pub const fn new(min: u8, max: u8, current: u8) -> Self {
        Self { min, max, current }
    }

    /// Check if `version` falls within `min..=max`
    pub const fn contains(&self, version: u8) -> bool {
        version >= self.min && version <= self.max
    }
}

/// Identity of a cluster peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Cluster-wide unique name
    pub name: String,
    /// Informational tags
    pub tags: BTreeMap<String, String>,
    /// Gossip address
    pub address: IpAddr,
    /// Gossip port
    pub port: u16,
    /// Current liveness state
    pub state: MemberState,
    /// Membership protocol versions
    pub membership_protocol: ProtocolRange,
    /// Cluster protocol versions
    pub cluster_protocol: ProtocolRange,
}

impl Member {
    /// Create an alive member with no tags and zeroed protocol ranges
    pub fn new(name: impl Into<String>, address: IpAddr, port: u16) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            address,
            port,
            state: MemberState::Alive,
            membership_protocol: ProtocolRange::default(),
            cluster_protocol: ProtocolRange::default(),
        }
    }

    /// Add a single tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Replace all tags
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the membership protocol range
    pub fn with_membership_protocol(mut self, range: ProtocolRange) -> Self {
        self.membership_protocol = range;
        self
    }

    /// Set the cluster protocol range
    pub fn with_cluster_protocol(mut self, range: ProtocolRange) -> Self {
        self.cluster_protocol = range;
        self
    }

    /// Set the liveness state
    pub fn with_state(mut self, state: MemberState) -> Self {
        self.state = state;
        self
    }

    /// Key comparison: members are the same peer iff their names match
    pub fn same_name(&self, other: &Member) -> bool {
        self.name == other.name
    }

    /// `address:port` pair
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.address, self.port)
    }
}
