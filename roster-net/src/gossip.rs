//! Glue between a transport and the membership engine
//!
//! Inbound frames are either single facts, applied straight to the engine,
//! or a peer's digest. A digest is answered with every local fact the peer
//! has not caught up with, restated from the local records.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::RngCore;
use tracing::{debug, trace};

use roster_core::clock::LogicalTime;
use roster_core::membership::{ApplyOutcome, MemberFact, Membership};
use roster_core::status::MemberStatus;

use crate::protocol::{Frame, MemberMessage, MembershipDigest};
use crate::traits::GossipTransport;
use crate::Result;

/// What a handler made of one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A fact was decoded and applied
    Fact(ApplyOutcome),
    /// A peer's digest was compared against the local registry
    Digest {
        /// Node that produced the digest
        sender: String,
        /// Local facts the peer is missing or holds an older version of
        missing: Vec<MemberFact>,
    },
}

impl Inbound {
    /// Outcome of an applied fact, `None` for digests
    pub fn outcome(&self) -> Option<ApplyOutcome> {
        match self {
            Inbound::Fact(outcome) => Some(*outcome),
            Inbound::Digest { .. } => None,
        }
    }
}

/// Feeds inbound frames into a [`Membership`] and gossips digests out
pub struct GossipHandler<T, R = StdRng> {
    local: String,
    membership: Arc<Membership<R>>,
    transport: T,
}

impl<T: GossipTransport, R: RngCore> GossipHandler<T, R> {
    /// Create a handler for the node named `local`
    pub fn new(local: impl Into<String>, membership: Arc<Membership<R>>, transport: T) -> Self {
        Self {
            local: local.into(),
            membership,
            transport,
        }
    }

    /// Name of the local node
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Shared engine
    pub fn membership(&self) -> &Arc<Membership<R>> {
        &self.membership
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Decode a frame and act on it. Facts are applied; digests are compared
    /// and the facts the peer lacks are returned, not sent.
    pub fn handle_bytes(&self, from: SocketAddr, bytes: &[u8]) -> Result<Inbound> {
        match Frame::deserialize(bytes)? {
            Frame::Fact(message) => {
                let outcome = self.membership.apply(message.into_fact()?);
                trace!(%from, ?outcome, "applied gossip");
                Ok(Inbound::Fact(outcome))
            }
            Frame::Digest(digest) => {
                let missing = self.missing_from(&digest);
                debug!(%from, sender = %digest.sender, missing = missing.len(), "compared digest");
                Ok(Inbound::Digest {
                    sender: digest.sender,
                    missing,
                })
            }
        }
    }

    /// Receive one frame from the transport and act on it, answering a
    /// digest with the facts its sender is missing
    pub async fn pump_once(&self) -> Result<Inbound> {
        let (from, bytes) = self.transport.recv().await?;
        let inbound = self.handle_bytes(from, &bytes)?;
        if let Inbound::Digest { missing, .. } = &inbound {
            for fact in missing {
                self.send_message(from, &MemberMessage::new(fact.clone()))
                    .await?;
            }
        }
        Ok(inbound)
    }

    /// Local facts newer than what `digest` reports, one per record
    pub fn missing_from(&self, digest: &MembershipDigest) -> Vec<MemberFact> {
        let known: HashMap<&str, LogicalTime> = digest
            .entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.time))
            .collect();

        self.membership
            .members()
            .iter()
            .filter(|status| {
                known
                    .get(status.name())
                    .map_or(true, |&time| time < status.last_message_time)
            })
            .map(MemberFact::from_status)
            .collect()
    }

    /// Random member other than the local node, gone or live.
    ///
    /// Uniform over the candidates; `None` only when there are none.
    pub fn pick_target(&self) -> Option<MemberStatus> {
        let local = self.local.as_str();
        self.membership
            .random_member_where(|status| status.name() != local)
    }

    /// Digest of the local registry
    pub fn digest(&self) -> MembershipDigest {
        MembershipDigest::from_statuses(self.local.clone(), &self.membership.members())
    }

    /// Send the local digest to one random peer.
    ///
    /// Returns the address gossiped to, or `None` when no peer is known.
    pub async fn gossip_digest(&self) -> Result<Option<SocketAddr>> {
        let target = match self.pick_target() {
            Some(target) => target.member.socket_addr(),
            None => {
                debug!("no gossip target available");
                return Ok(None);
            }
        };
        let bytes = self.digest().serialize()?;
        self.transport.send(target, &bytes).await?;
        Ok(Some(target))
    }

    /// Encode a fact and send it to `to`
    pub async fn send_message(&self, to: SocketAddr, message: &MemberMessage) -> Result<()> {
        let bytes = message.serialize()?;
        self.transport.send(to, &bytes).await
    }
}
