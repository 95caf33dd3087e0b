//! Message envelopes and digests
//!
//! Everything on the wire is a postcard-encoded [`Frame`]: either one fact or
//! a digest of the sender's registry. The layout is an implementation detail
//! of this crate; fact envelopes are versioned so that peers can refuse what
//! they do not understand.

use serde::{Deserialize, Serialize};

use roster_core::clock::LogicalTime;
use roster_core::member::{Member, MemberState};
use roster_core::membership::MemberFact;
use roster_core::operation::MessageKind;
use roster_core::status::MemberStatus;

use crate::{Error, Result};

/// Envelope carrying one membership fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMessage {
    /// Protocol version (major, minor)
    pub version: (u8, u8),
    /// Kind of fact
    pub kind: MessageKind,
    /// Node the fact is about
    pub origin: String,
    /// Logical time stamped by the origin
    pub time: LogicalTime,
    /// Member descriptor, present for joins and updates
    pub member: Option<Member>,
}

impl MemberMessage {
    /// Current protocol version
    pub const CURRENT_VERSION: (u8, u8) = (0, 1);

    /// Wrap a fact in an envelope
    pub fn new(fact: MemberFact) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            kind: fact.kind,
            origin: fact.origin,
            time: fact.time,
            member: fact.member,
        }
    }

    /// Set the protocol version
    pub fn with_version(mut self, version: (u8, u8)) -> Self {
        self.version = version;
        self
    }

    /// Serialize the envelope as a fact frame
    pub fn serialize(&self) -> core::result::Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(&FrameRef::Fact(self))
    }

    /// Deserialize a fact frame
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        match Frame::deserialize(bytes)? {
            Frame::Fact(message) => Ok(message),
            Frame::Digest(_) => Err(Error::UnexpectedFrame { expected: "fact" }),
        }
    }

    /// Unwrap into a validated fact.
    ///
    /// Envelopes from a different major version are refused.
    pub fn into_fact(self) -> Result<MemberFact> {
        if self.version.0 != Self::CURRENT_VERSION.0 {
            return Err(Error::UnsupportedVersion(self.version));
        }
        let fact = MemberFact {
            kind: self.kind,
            origin: self.origin,
            time: self.time,
            member: self.member,
        };
        fact.validate()?;
        Ok(fact)
    }
}

impl From<MemberFact> for MemberMessage {
    fn from(fact: MemberFact) -> Self {
        Self::new(fact)
    }
}

/// One line of a membership digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    /// Member name
    pub name: String,
    /// Locally known state
    pub state: MemberState,
    /// Newest logical time applied to the record
    pub time: LogicalTime,
}

/// Compact view of a registry, exchanged during anti-entropy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipDigest {
    /// Node that produced the digest
    pub sender: String,
    /// One entry per record
    pub entries: Vec<DigestEntry>,
}

impl MembershipDigest {
    /// Build a digest from registry records
    pub fn from_statuses(sender: impl Into<String>, statuses: &[MemberStatus]) -> Self {
        let entries = statuses
            .iter()
            .map(|status| DigestEntry {
                name: status.member.name.clone(),
                state: status.member.state,
                time: status.last_message_time,
            })
            .collect();
        Self {
            sender: sender.into(),
            entries,
        }
    }

    /// Entry for `name`, if present
    pub fn entry(&self, name: &str) -> Option<&DigestEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Serialize the digest as a digest frame
    pub fn serialize(&self) -> core::result::Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(&FrameRef::Digest(self))
    }

    /// Deserialize a digest frame
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        match Frame::deserialize(bytes)? {
            Frame::Digest(digest) => Ok(digest),
            Frame::Fact(_) => Err(Error::UnexpectedFrame { expected: "digest" }),
        }
    }
}

/// A decoded wire frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// One membership fact
    Fact(MemberMessage),
    /// The sender's registry at a glance
    Digest(MembershipDigest),
}

impl Frame {
    /// Serialize the frame to bytes
    pub fn serialize(&self) -> core::result::Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserialize from bytes
    pub fn deserialize(bytes: &[u8]) -> core::result::Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

// Same variant order as `Frame`, so both encode identically
#[derive(Serialize)]
enum FrameRef<'a> {
    Fact(&'a MemberMessage),
    Digest(&'a MembershipDigest),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

    fn member(name: &str) -> Member {
        Member::new(name, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 7946).with_tag("role", "edge")
    }

    #[test]
    fn join_envelope_decodes_to_same_fact() {
        let fact = MemberFact::join(member("n1"), LogicalTime::new(9));
        let bytes = MemberMessage::new(fact.clone()).serialize().unwrap();

        let decoded = MemberMessage::deserialize(&bytes).unwrap();
        assert_eq!(decoded.version, MemberMessage::CURRENT_VERSION);
        assert_eq!(decoded.into_fact().unwrap(), fact);
    }

    #[test]
    fn into_fact_rejects_other_major_version() {
        let message = MemberMessage::new(MemberFact::leave("n1", LogicalTime::new(1)))
            .with_version((1, 0));
        assert!(matches!(
            message.into_fact(),
            Err(Error::UnsupportedVersion((1, 0)))
        ));
    }

    #[test]
    fn into_fact_accepts_newer_minor_version() {
        let message = MemberMessage::new(MemberFact::leave("n1", LogicalTime::new(1)))
            .with_version((0, 9));
        assert!(message.into_fact().is_ok());
    }

    #[test]
    fn into_fact_rejects_join_without_descriptor() {
        let message = MemberMessage {
            version: MemberMessage::CURRENT_VERSION,
            kind: MessageKind::Join,
            origin: "n1".to_string(),
            time: LogicalTime::new(1),
            member: None,
        };
        assert!(matches!(message.into_fact(), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let bytes = MemberMessage::new(MemberFact::join(member("n1"), LogicalTime::new(3)))
            .serialize()
            .unwrap();
        assert!(MemberMessage::deserialize(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn digest_lists_every_record() {
        let now = Instant::now();
        let statuses = vec![
            MemberStatus::live(member("a"), LogicalTime::new(2)),
            MemberStatus::gone(
                member("b").with_state(MemberState::Left),
                LogicalTime::new(7),
                now,
            ),
        ];

        let digest = MembershipDigest::from_statuses("a", &statuses);
        assert_eq!(digest.entries.len(), 2);
        assert_eq!(digest.entry("b").unwrap().state, MemberState::Left);
        assert_eq!(digest.entry("b").unwrap().time, LogicalTime::new(7));

        let bytes = digest.serialize().unwrap();
        assert_eq!(MembershipDigest::deserialize(&bytes).unwrap(), digest);
    }

    #[test]
    fn frames_are_told_apart() {
        let message = MemberMessage::new(MemberFact::leave("n1", LogicalTime::new(4)));
        let digest = MembershipDigest::from_statuses(
            "a",
            &[MemberStatus::live(member("a"), LogicalTime::new(1))],
        );

        let fact_bytes = message.serialize().unwrap();
        let digest_bytes = digest.serialize().unwrap();
        assert_eq!(Frame::deserialize(&fact_bytes).unwrap(), Frame::Fact(message.clone()));
        assert_eq!(Frame::deserialize(&digest_bytes).unwrap(), Frame::Digest(digest.clone()));
        assert_eq!(Frame::Fact(message).serialize().unwrap(), fact_bytes);

        assert!(matches!(
            MemberMessage::deserialize(&digest_bytes),
            Err(Error::UnexpectedFrame { expected: "fact" })
        ));
        assert!(matches!(
            MembershipDigest::deserialize(&fact_bytes),
            Err(Error::UnexpectedFrame { expected: "digest" })
        ));
    }
}
