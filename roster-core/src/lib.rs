//! # Roster Core
//!
//! Membership bookkeeping for gossip-based clusters.
//!
//! This crate provides:
//! - A logical clock type used to order membership facts causally
//! - Member descriptors and their status snapshots
//! - A time-bounded status registry with random sampling for gossip targets
//! - A per-node ordering gate that rejects stale or duplicate facts
//! - The [`Membership`](membership::Membership) engine combining both under
//!   one critical section
//!
//! Nothing in this crate performs I/O. Transports feed facts in, an external
//! timer drives [`Membership::sweep`](membership::Membership::sweep).

pub mod clock;
pub mod config;
pub mod member;
pub mod membership;
pub mod operation;
pub mod status;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::LogicalTime;
    pub use crate::config::MembershipConfig;
    pub use crate::member::{Member, MemberState, ProtocolRange};
    pub use crate::membership::{ApplyOutcome, MemberFact, Membership, SweepReport};
    pub use crate::operation::{MemberOperation, MessageKind, OperationBook};
    pub use crate::status::{MemberStatus, StatusBook};
}

/// Result type for membership operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for membership bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Random sampling was requested from a registry holding no records
    #[error("member registry is empty")]
    EmptyRegistry,
    /// A configuration value is out of range
    #[error("invalid membership configuration: {0}")]
    InvalidConfig(&'static str),
    /// A fact needed a member descriptor but carried none
    #[error("fact about `{member}` carries no member descriptor")]
    MissingDescriptor {
        /// Name of the member the fact was about
        member: String,
    },
    /// A fact's descriptor names a different member than its origin
    #[error("fact from `{origin}` carries a descriptor for `{member}`")]
    DescriptorMismatch {
        /// Node the fact is about
        origin: String,
        /// Name inside the descriptor
        member: String,
    },
}
