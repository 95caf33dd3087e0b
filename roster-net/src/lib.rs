//! # Roster Network
//!
//! The gossip boundary of the membership engine.
//!
//! This crate provides:
//! - `MemberMessage`, the envelope carrying one membership fact
//! - `MembershipDigest`, a compact view of the local registry for peers
//! - The `GossipTransport` trait that real transports implement
//! - `GossipHandler`, which feeds inbound envelopes into a
//!   [`Membership`](roster_core::membership::Membership) and picks targets
//! - Mock transport and network for tests

pub mod gossip;
pub mod protocol;
pub mod traits;

mod mock;
pub use mock::{MockNetwork, MockTransport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::gossip::*;
    pub use crate::protocol::*;
    pub use crate::traits::*;
}

/// Result type for network operations
pub type Result<T> = core::result::Result<T, Error>;

/// Network error types
#[derive(Debug)]
pub enum Error {
    /// Envelope could not be encoded or decoded
    Codec(postcard::Error),
    /// Envelope decoded but its fact is malformed
    InvalidMessage(roster_core::Error),
    /// Envelope speaks an incompatible protocol version
    UnsupportedVersion((u8, u8)),
    /// Frame decoded but is not the kind the caller asked for
    UnexpectedFrame {
        /// Kind of frame that was wanted
        expected: &'static str,
    },
    /// Send failed
    SendFailed,
    /// Receive failed
    ReceiveFailed,
    /// Transport has nothing more to deliver
    Closed,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Codec(e) => Some(e),
            Error::InvalidMessage(e) => Some(e),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Codec(e) => write!(f, "codec error: {}", e),
            Error::InvalidMessage(e) => write!(f, "invalid message: {}", e),
            Error::UnsupportedVersion((major, minor)) => {
                write!(f, "unsupported protocol version {}.{}", major, minor)
            }
            Error::UnexpectedFrame { expected } => write!(f, "expected a {} frame", expected),
            Error::SendFailed => write!(f, "send failed"),
            Error::ReceiveFailed => write!(f, "receive failed"),
            Error::Closed => write!(f, "transport closed"),
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::Codec(e)
    }
}

impl From<roster_core::Error> for Error {
    fn from(e: roster_core::Error) -> Self {
        Error::InvalidMessage(e)
    }
}
