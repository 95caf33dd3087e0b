//! Membership engine
//!
//! [`Membership`] puts the ordering gate and the status registry behind one
//! lock, so that "check the gate, then mutate the registry" runs as a single
//! critical section per fact. Two facts about the same node delivered
//! concurrently are therefore applied in logical-time order, whatever order
//! the transport handed them over in.
//!
//! ## Fact handling
//!
//! | kind            | member known                   | member unknown            |
//! |-----------------|--------------------------------|---------------------------|
//! | `Join`          | refresh, mark alive            | add (needs descriptor)    |
//! | `Update`        | refresh descriptor, keep state | add (needs descriptor)    |
//! | `Leave`/`Failed`| mark gone at `now`             | gate only                 |
//!
//! "Gate only" still matters: the stored slot makes an older join for the
//! same node stale, so a node that left cannot be resurrected by late gossip.
//! For known members the record's own time is checked as well, since gate
//! slots age out long before gone records do.

use std::time::Instant;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_core::RngCore;
use tracing::{debug, info, warn};

use crate::clock::LogicalTime;
use crate::config::MembershipConfig;
use crate::member::{Member, MemberState};
use crate::operation::{MessageKind, OperationBook};
use crate::status::{MemberStatus, StatusBook};
use crate::{Error, Result};

/// A membership fact as delivered by the gossip transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFact {
    /// Kind of the fact
    pub kind: MessageKind,
    /// Node the fact is about
    pub origin: String,
    /// Logical time stamped by the origin
    pub time: LogicalTime,
    /// Descriptor, required for joins and updates of unknown members
    pub member: Option<Member>,
}

impl MemberFact {
    /// Join fact carrying the joining member's descriptor
    pub fn join(member: Member, time: LogicalTime) -> Self {
        Self {
            kind: MessageKind::Join,
            origin: member.name.clone(),
            time,
            member: Some(member),
        }
    }

    /// Update fact carrying the new descriptor
    pub fn update(member: Member, time: LogicalTime) -> Self {
        Self {
            kind: MessageKind::Update,
            origin: member.name.clone(),
            time,
            member: Some(member),
        }
    }

    /// Graceful leave of `origin`
    pub fn leave(origin: impl Into<String>, time: LogicalTime) -> Self {
        Self {
            kind: MessageKind::Leave,
            origin: origin.into(),
            time,
            member: None,
        }
    }

    /// `origin` was declared failed
    pub fn failed(origin: impl Into<String>, time: LogicalTime) -> Self {
        Self {
            kind: MessageKind::Failed,
            origin: origin.into(),
            time,
            member: None,
        }
    }

    /// Restate a record as the fact that produced its current state.
    ///
    /// Live records become joins carrying the descriptor, gone records
    /// become leaves or failures, all at the record's last message time.
    pub fn from_status(status: &MemberStatus) -> Self {
        let time = status.last_message_time;
        match status.member.state {
            MemberState::Alive => Self::join(status.member.clone(), time),
            MemberState::Failed => Self::failed(status.name(), time),
            MemberState::Leaving | MemberState::Left => Self::leave(status.name(), time),
        }
    }

    /// Check the fact is well formed.
    ///
    /// Joins and updates must carry a descriptor, and any descriptor must
    /// name the origin.
    pub fn validate(&self) -> Result<()> {
        match &self.member {
            Some(member) if member.name != self.origin => Err(Error::DescriptorMismatch {
                origin: self.origin.clone(),
                member: member.name.clone(),
            }),
            None if !self.kind.is_departure() => Err(Error::MissingDescriptor {
                member: self.origin.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// What [`Membership::apply`] did with a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new live record was added
    Added,
    /// An existing record was refreshed
    Updated,
    /// An existing record was marked left or failed
    MarkedGone,
    /// Accepted by the gate, but no record to change
    Recorded,
    /// Rejected as stale or duplicate; nothing changed
    Stale,
}

impl ApplyOutcome {
    /// Whether the fact passed the ordering gate
    pub fn is_accepted(self) -> bool {
        !matches!(self, ApplyOutcome::Stale)
    }
}

/// Result of one cleanup sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Gone members whose grace period ran out
    pub expired: Vec<MemberStatus>,
    /// Gate slots dropped for age
    pub operations_evicted: usize,
}

#[derive(Debug)]
struct Books<R> {
    statuses: StatusBook<R>,
    operations: OperationBook,
}

/// Gate plus registry under a single lock
#[derive(Debug)]
pub struct Membership<R = StdRng> {
    books: Mutex<Books<R>>,
    config: MembershipConfig,
}

impl Membership<StdRng> {
    /// Create an engine sampling from an entropy-seeded generator
    pub fn new(config: MembershipConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: RngCore> Membership<R> {
    /// Create an engine sampling from `rng`
    pub fn with_rng(config: MembershipConfig, rng: R) -> Result<Self> {
        config.validate()?;
        let books = Books {
            statuses: StatusBook::with_rng(config.gone_timeout(), rng),
            operations: OperationBook::new(config.operation_timeout()),
        };
        Ok(Self {
            books: Mutex::new(books),
            config,
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    /// Apply a fact received now
    pub fn apply(&self, fact: MemberFact) -> ApplyOutcome {
        self.apply_at(fact, Instant::now())
    }

    /// Apply a fact received at `now`.
    ///
    /// Stale facts are dropped silently; they are expected under gossip.
    pub fn apply_at(&self, fact: MemberFact, now: Instant) -> ApplyOutcome {
        let mut books = self.books.lock();

        // The gate slot may have aged out while the record is still held
        if let Some(status) = books.statuses.get(&fact.origin) {
            if fact.time <= status.last_message_time {
                debug!(
                    member = %fact.origin,
                    kind = %fact.kind,
                    time = %fact.time,
                    record_time = %status.last_message_time,
                    "dropping fact older than the member record"
                );
                return ApplyOutcome::Stale;
            }
        }

        if !books
            .operations
            .save_at(fact.kind, &fact.origin, fact.time, now)
        {
            debug!(member = %fact.origin, kind = %fact.kind, time = %fact.time, "dropping stale fact");
            return ApplyOutcome::Stale;
        }

        let MemberFact {
            kind,
            origin,
            time,
            member,
        } = fact;

        let member = match member {
            Some(member) if member.name != origin => {
                warn!(member = %origin, descriptor = %member.name, "ignoring mismatched descriptor");
                None
            }
            other => other,
        };

        match books.statuses.get_mut(&origin) {
            Some(status) => {
                status.last_message_time = time;
                match kind {
                    MessageKind::Join => {
                        if let Some(member) = member {
                            status.member = member;
                        }
                        if status.gone_time.take().is_some() {
                            info!(member = %origin, %time, "member rejoined");
                        }
                        status.member.state = MemberState::Alive;
                        ApplyOutcome::Updated
                    }
                    MessageKind::Update => {
                        if let Some(member) = member {
                            let state = status.member.state;
                            status.member = member;
                            status.member.state = state;
                        }
                        ApplyOutcome::Updated
                    }
                    MessageKind::Leave | MessageKind::Failed => {
                        status.member.state = departure_state(kind);
                        status.gone_time.get_or_insert(now);
                        info!(member = %origin, %kind, %time, "member gone");
                        ApplyOutcome::MarkedGone
                    }
                }
            }
            None => match (kind, member) {
                (MessageKind::Join | MessageKind::Update, Some(mut member)) => {
                    member.state = MemberState::Alive;
                    info!(member = %origin, %time, address = %member.socket_addr(), "member added");
                    books.statuses.add(MemberStatus::live(member, time));
                    ApplyOutcome::Added
                }
                _ => {
                    debug!(member = %origin, %kind, %time, "recorded fact for unknown member");
                    ApplyOutcome::Recorded
                }
            },
        }
    }

    /// Evict expired gone members and aged gate slots.
    ///
    /// Safe to call at any cadence as long as `now` does not go backwards.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut books = self.books.lock();
        let expired = books.statuses.cleanup(now);
        let operations_evicted = books.operations.cleanup(now);
        drop(books);

        for status in &expired {
            info!(member = %status.name(), state = %status.member.state, "forgetting member");
        }
        debug!(
            expired = expired.len(),
            operations_evicted, "membership sweep finished"
        );

        SweepReport {
            expired,
            operations_evicted,
        }
    }

    /// Number of records, live and gone
    pub fn count(&self) -> usize {
        self.books.lock().statuses.count()
    }

    /// Snapshot of member names
    pub fn names(&self) -> Vec<String> {
        self.books.lock().statuses.names()
    }

    /// A uniformly random record, for gossip target selection
    pub fn random_member(&self) -> Result<MemberStatus> {
        self.books.lock().statuses.random_get().cloned()
    }

    /// A uniformly random record among those satisfying `accept`.
    ///
    /// `None` only when no record matches.
    pub fn random_member_where<F>(&self, accept: F) -> Option<MemberStatus>
    where
        F: FnMut(&MemberStatus) -> bool,
    {
        self.books.lock().statuses.random_get_where(accept).cloned()
    }

    /// Snapshot of every record
    pub fn members(&self) -> Vec<MemberStatus> {
        self.books.lock().statuses.iter().cloned().collect()
    }

    /// Snapshot of live member descriptors
    pub fn live_members(&self) -> Vec<Member> {
        self.books
            .lock()
            .statuses
            .iter()
            .filter(|status| status.is_live())
            .map(|status| status.member.clone())
            .collect()
    }

    /// Record for `name`, if known
    pub fn member(&self, name: &str) -> Option<MemberStatus> {
        self.books.lock().statuses.get(name).cloned()
    }

    /// Forget every record named `name`; the gate slot is kept
    pub fn remove(&self, name: &str) -> usize {
        self.books.lock().statuses.remove(name)
    }

    /// Newest accepted time for `name` if the stored fact is of `kind`
    pub fn last_fact_time(&self, name: &str, kind: MessageKind) -> Option<LogicalTime> {
        self.books.lock().operations.get(name, kind)
    }

    /// Number of nodes with a gate slot
    pub fn operation_count(&self) -> usize {
        self.books.lock().operations.len()
    }
}

fn departure_state(kind: MessageKind) -> MemberState {
    match kind {
        MessageKind::Failed => MemberState::Failed,
        _ => MemberState::Left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    fn member(name: &str) -> Member {
        Member::new(name, IpAddr::V4(Ipv4Addr::LOCALHOST), 7946)
    }

    fn t(value: u64) -> LogicalTime {
        LogicalTime::new(value)
    }

    fn engine(gone_secs: u64, operation_secs: u64) -> Membership {
        let config = MembershipConfig {
            gone_timeout_secs: gone_secs,
            operation_timeout_secs: operation_secs,
            ..Default::default()
        };
        Membership::with_rng(config, StdRng::seed_from_u64(11)).unwrap()
    }

    #[test]
    fn join_leave_then_late_join_stays_gone() {
        let membership = engine(60, 60);
        let now = Instant::now();

        assert_eq!(
            membership.apply_at(MemberFact::join(member("n1"), t(1)), now),
            ApplyOutcome::Added
        );
        assert_eq!(
            membership.apply_at(MemberFact::leave("n1", t(5)), now),
            ApplyOutcome::MarkedGone
        );
        assert_eq!(
            membership.apply_at(MemberFact::join(member("n1"), t(3)), now),
            ApplyOutcome::Stale
        );

        let status = membership.member("n1").unwrap();
        assert_eq!(status.gone_time, Some(now));
        assert_eq!(status.member.state, MemberState::Left);
        assert_eq!(status.last_message_time, t(5));
        assert_eq!(membership.count(), 1);
    }

    #[test]
    fn late_join_after_gate_eviction_stays_gone() {
        // Default config: gate slots age out long before gone records do
        let membership = Membership::with_rng(MembershipConfig::default(), StdRng::seed_from_u64(3))
            .unwrap();
        let t0 = Instant::now();

        membership.apply_at(MemberFact::join(member("n1"), t(1)), t0);
        membership.apply_at(MemberFact::leave("n1", t(5)), t0);

        let report = membership.sweep(t0 + Duration::from_secs(6 * 60));
        assert!(report.expired.is_empty());
        assert_eq!(report.operations_evicted, 1);
        assert_eq!(membership.operation_count(), 0);

        let later = t0 + Duration::from_secs(7 * 60);
        assert_eq!(
            membership.apply_at(MemberFact::join(member("n1"), t(3)), later),
            ApplyOutcome::Stale
        );
        assert_eq!(
            membership.apply_at(MemberFact::join(member("n1"), t(5)), later),
            ApplyOutcome::Stale
        );

        let status = membership.member("n1").unwrap();
        assert!(!status.is_live());
        assert_eq!(status.member.state, MemberState::Left);
        assert_eq!(status.last_message_time, t(5));
        assert_eq!(membership.operation_count(), 0);
    }

    #[test]
    fn late_departure_after_gate_eviction_keeps_member_alive() {
        let membership = engine(3600, 60);
        let t0 = Instant::now();

        membership.apply_at(MemberFact::join(member("n1"), t(1)), t0);
        membership.apply_at(MemberFact::join(member("n1"), t(9)), t0);
        assert_eq!(membership.sweep(t0 + Duration::from_secs(120)).operations_evicted, 1);

        assert_eq!(
            membership.apply_at(MemberFact::leave("n1", t(2)), t0 + Duration::from_secs(121)),
            ApplyOutcome::Stale
        );
        let status = membership.member("n1").unwrap();
        assert!(status.is_live());
        assert_eq!(status.last_message_time, t(9));

        // A genuinely newer fact still goes through and refills the gate
        assert_eq!(
            membership.apply_at(MemberFact::leave("n1", t(10)), t0 + Duration::from_secs(122)),
            ApplyOutcome::MarkedGone
        );
        assert_eq!(membership.last_fact_time("n1", MessageKind::Leave), Some(t(10)));
    }

    #[test]
    fn leave_for_unknown_member_blocks_older_join() {
        let membership = engine(60, 60);

        assert_eq!(
            membership.apply(MemberFact::leave("n1", t(4))),
            ApplyOutcome::Recorded
        );
        assert_eq!(
            membership.apply(MemberFact::join(member("n1"), t(2))),
            ApplyOutcome::Stale
        );
        assert_eq!(membership.count(), 0);
        assert_eq!(membership.last_fact_time("n1", MessageKind::Leave), Some(t(4)));
    }

    #[test]
    fn newer_join_revives_gone_member() {
        let membership = engine(60, 60);
        let now = Instant::now();

        membership.apply_at(MemberFact::join(member("n1"), t(1)), now);
        membership.apply_at(MemberFact::failed("n1", t(2)), now);
        assert_eq!(
            membership.member("n1").unwrap().member.state,
            MemberState::Failed
        );

        let outcome = membership.apply_at(MemberFact::join(member("n1"), t(3)), now);
        assert_eq!(outcome, ApplyOutcome::Updated);

        let status = membership.member("n1").unwrap();
        assert!(status.is_live());
        assert_eq!(status.member.state, MemberState::Alive);
        assert_eq!(membership.count(), 1);
    }

    #[test]
    fn update_replaces_descriptor_but_keeps_state() {
        let membership = engine(60, 60);
        let now = Instant::now();

        membership.apply_at(MemberFact::join(member("n1"), t(1)), now);
        membership.apply_at(MemberFact::leave("n1", t(2)), now);
        let outcome = membership.apply_at(
            MemberFact::update(member("n1").with_tag("zone", "b"), t(3)),
            now,
        );
        assert_eq!(outcome, ApplyOutcome::Updated);

        let status = membership.member("n1").unwrap();
        assert_eq!(status.member.tags.get("zone").map(String::as_str), Some("b"));
        assert_eq!(status.member.state, MemberState::Left);
        assert_eq!(status.gone_time, Some(now));
    }

    #[test]
    fn departure_keeps_first_gone_time() {
        let membership = engine(60, 60);
        let first = Instant::now();
        let later = first + Duration::from_secs(5);

        membership.apply_at(MemberFact::join(member("n1"), t(1)), first);
        membership.apply_at(MemberFact::leave("n1", t(2)), first);
        membership.apply_at(MemberFact::failed("n1", t(3)), later);

        let status = membership.member("n1").unwrap();
        assert_eq!(status.gone_time, Some(first));
        assert_eq!(status.member.state, MemberState::Failed);
    }

    #[test]
    fn duplicate_join_is_stale() {
        let membership = engine(60, 60);
        assert_eq!(
            membership.apply(MemberFact::join(member("n1"), t(1))),
            ApplyOutcome::Added
        );
        assert_eq!(
            membership.apply(MemberFact::join(member("n1"), t(1))),
            ApplyOutcome::Stale
        );
        assert_eq!(membership.count(), 1);
    }

    #[test]
    fn mismatched_descriptor_is_not_added() {
        let membership = engine(60, 60);
        let mut fact = MemberFact::join(member("n2"), t(1));
        fact.origin = "n1".to_string();

        assert!(matches!(
            fact.validate(),
            Err(Error::DescriptorMismatch { .. })
        ));
        assert_eq!(membership.apply(fact), ApplyOutcome::Recorded);
        assert_eq!(membership.count(), 0);
    }

    #[test]
    fn restated_facts_rebuild_the_record_elsewhere() {
        let source = engine(60, 60);
        let now = Instant::now();
        source.apply_at(MemberFact::join(member("a").with_tag("role", "db"), t(1)), now);
        source.apply_at(MemberFact::join(member("b"), t(2)), now);
        source.apply_at(MemberFact::failed("b", t(4)), now);

        let a = MemberFact::from_status(&source.member("a").unwrap());
        assert_eq!(a, MemberFact::join(member("a").with_tag("role", "db"), t(1)));
        let b = MemberFact::from_status(&source.member("b").unwrap());
        assert_eq!(b, MemberFact::failed("b", t(4)));

        let replica = engine(60, 60);
        replica.apply_at(MemberFact::join(member("b"), t(2)), now);
        assert_eq!(replica.apply_at(a, now), ApplyOutcome::Added);
        assert_eq!(replica.apply_at(b, now), ApplyOutcome::MarkedGone);
        assert_eq!(replica.member("b").unwrap().member.state, MemberState::Failed);
    }

    #[test]
    fn validate_requires_descriptor_for_join() {
        let fact = MemberFact {
            kind: MessageKind::Join,
            origin: "n1".to_string(),
            time: t(1),
            member: None,
        };
        assert_eq!(
            fact.validate(),
            Err(Error::MissingDescriptor {
                member: "n1".to_string()
            })
        );
        assert!(MemberFact::leave("n1", t(1)).validate().is_ok());
    }

    #[test]
    fn sweep_evicts_both_books() {
        let membership = engine(10, 30);
        let t0 = Instant::now();

        membership.apply_at(MemberFact::join(member("stay"), t(1)), t0);
        membership.apply_at(MemberFact::join(member("go"), t(1)), t0);
        membership.apply_at(MemberFact::leave("go", t(2)), t0);

        let report = membership.sweep(t0 + Duration::from_secs(9));
        assert!(report.expired.is_empty());
        assert_eq!(report.operations_evicted, 0);

        let report = membership.sweep(t0 + Duration::from_secs(11));
        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].name(), "go");
        assert_eq!(membership.names(), vec!["stay".to_string()]);

        let report = membership.sweep(t0 + Duration::from_secs(31));
        assert!(report.expired.is_empty());
        assert_eq!(report.operations_evicted, 2);
        assert_eq!(membership.operation_count(), 0);
        assert_eq!(membership.count(), 1);
    }

    #[test]
    fn random_member_on_empty_engine_fails() {
        let membership = engine(60, 60);
        assert_eq!(membership.random_member(), Err(Error::EmptyRegistry));
        assert!(membership.random_member_where(|_| true).is_none());
    }

    #[test]
    fn random_member_where_skips_rejected() {
        let membership = engine(60, 60);
        membership.apply(MemberFact::join(member("self"), t(1)));
        membership.apply(MemberFact::join(member("peer"), t(1)));

        for _ in 0..50 {
            let picked = membership
                .random_member_where(|status| status.name() != "self")
                .unwrap();
            assert_eq!(picked.name(), "peer");
        }
    }

    #[test]
    fn live_members_excludes_gone() {
        let membership = engine(60, 60);
        membership.apply(MemberFact::join(member("a"), t(1)));
        membership.apply(MemberFact::join(member("b"), t(1)));
        membership.apply(MemberFact::failed("b", t(2)));

        let live: Vec<String> = membership
            .live_members()
            .into_iter()
            .map(|member| member.name)
            .collect();
        assert_eq!(live, vec!["a".to_string()]);
        assert_eq!(membership.members().len(), 2);
    }

    #[test]
    fn remove_keeps_gate_slot() {
        let membership = engine(60, 60);
        membership.apply(MemberFact::join(member("n1"), t(5)));

        assert_eq!(membership.remove("n1"), 1);
        assert_eq!(membership.remove("n1"), 0);
        assert_eq!(
            membership.apply(MemberFact::join(member("n1"), t(5))),
            ApplyOutcome::Stale
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MembershipConfig {
            operation_timeout_secs: 0,
            ..Default::default()
        };
        assert!(Membership::new(config).is_err());
    }

    #[test]
    fn concurrent_appliers_converge_on_newest_fact() {
        let membership = Arc::new(engine(60, 60));
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let membership = Arc::clone(&membership);
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        let time = t(i * 8 + worker + 1);
                        let fact = if time.get() % 2 == 0 {
                            MemberFact::join(member("n1"), time)
                        } else {
                            MemberFact::update(
                                member("n1").with_tag("seen", time.to_string()),
                                time,
                            )
                        };
                        membership.apply(fact);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(membership.count(), 1);
        let status = membership.member("n1").unwrap();
        assert_eq!(status.last_message_time, t(800));
        assert_eq!(membership.last_fact_time("n1", MessageKind::Join), Some(t(800)));
    }
}
