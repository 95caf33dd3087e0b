//! Member status registry
//!
//! [`StatusBook`] holds one [`MemberStatus`] per known peer, live or recently
//! gone. Gone records stay in the same pool as live ones so that random
//! gossip targets still include a recently failed node until its grace
//! period runs out; [`StatusBook::cleanup`] then forgets it.
//!
//! The book does not deduplicate by name. Callers consult the
//! [`OperationBook`](crate::operation::OperationBook) before adding.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_core::RngCore;

use crate::clock::LogicalTime;
use crate::member::Member;
use crate::{Error, Result};

/// A member plus the bookkeeping needed to order and expire it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    /// Member descriptor
    pub member: Member,
    /// Logical time of the newest fact applied to this record
    pub last_message_time: LogicalTime,
    /// Local instant the member was found gone; `None` while live
    pub gone_time: Option<Instant>,
}

impl MemberStatus {
    /// Status for a live member
    pub fn live(member: Member, last_message_time: LogicalTime) -> Self {
        Self {
            member,
            last_message_time,
            gone_time: None,
        }
    }

    /// Status for a member that was found gone at `gone_time`
    pub fn gone(member: Member, last_message_time: LogicalTime, gone_time: Instant) -> Self {
        Self {
            member,
            last_message_time,
            gone_time: Some(gone_time),
        }
    }

    /// Member name
    pub fn name(&self) -> &str {
        &self.member.name
    }

    /// Whether the record is still live
    pub fn is_live(&self) -> bool {
        self.gone_time.is_none()
    }

    /// Whether a gone record has outlived `timeout` at `now`
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        match self.gone_time {
            Some(gone) => now.saturating_duration_since(gone) > timeout,
            None => false,
        }
    }
}

/// Time-bounded collection of member statuses.
///
/// The random source is owned by the book so tests can inject a seeded one.
#[derive(Debug)]
pub struct StatusBook<R = StdRng> {
    members: Vec<MemberStatus>,
    timeout: Duration,
    rng: R,
}

impl StatusBook<StdRng> {
    /// Create an empty book; gone records survive `timeout` before removal
    pub fn new(timeout: Duration) -> Self {
        Self::with_rng(timeout, StdRng::from_entropy())
    }
}

impl<R: RngCore> StatusBook<R> {
    /// Create an empty book using `rng` for sampling
    pub fn with_rng(timeout: Duration, rng: R) -> Self {
        Self {
            members: Vec::new(),
            timeout,
            rng,
        }
    }

    /// Number of records, live and gone
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Whether the book holds no records
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append a record without checking for an existing one of the same name
    pub fn add(&mut self, status: MemberStatus) {
        self.members.push(status);
    }

    /// Pick one record uniformly at random.
    ///
    /// Fails with [`Error::EmptyRegistry`] when there is nothing to pick.
    pub fn random_get(&mut self) -> Result<&MemberStatus> {
        if self.members.is_empty() {
            return Err(Error::EmptyRegistry);
        }
        let index = self.rng.gen_range(0..self.members.len());
        Ok(&self.members[index])
    }

    /// Pick uniformly among the records satisfying `accept`
    pub fn random_get_where<F>(&mut self, mut accept: F) -> Option<&MemberStatus>
    where
        F: FnMut(&MemberStatus) -> bool,
    {
        let candidates: Vec<usize> = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, status)| accept(status))
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let pick = self.rng.gen_range(0..candidates.len());
        Some(&self.members[candidates[pick]])
    }

    /// Remove every record named `name`, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.members.len();
        self.members.retain(|status| status.member.name != name);
        before - self.members.len()
    }

    /// Drop gone records older than the timeout and hand them back.
    ///
    /// Live records and gone records with `now - gone_time <= timeout` stay.
    pub fn cleanup(&mut self, now: Instant) -> Vec<MemberStatus> {
        let timeout = self.timeout;
        let (expired, keep): (Vec<_>, Vec<_>) = self
            .members
            .drain(..)
            .partition(|status| status.is_expired(now, timeout));
        self.members = keep;
        expired
    }

    /// Snapshot of all member names
    pub fn names(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|status| status.member.name.clone())
            .collect()
    }

    /// First record named `name`
    pub fn get(&self, name: &str) -> Option<&MemberStatus> {
        self.members.iter().find(|status| status.member.name == name)
    }

    /// First record named `name`, mutably
    pub fn get_mut(&mut self, name: &str) -> Option<&mut MemberStatus> {
        self.members
            .iter_mut()
            .find(|status| status.member.name == name)
    }

    /// Iterate over all records
    pub fn iter(&self) -> impl Iterator<Item = &MemberStatus> {
        self.members.iter()
    }

    /// Grace period for gone records
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
