//! Ordering gate for membership facts
//!
//! Every fact about a node passes through [`OperationBook::save`] before it may
//! touch the status registry. The book keeps exactly one slot per node: the
//! newest fact accepted so far, whatever its kind.
//!
//! ## Rules
//!
//! - A fact is accepted iff the node has no slot, or the slot's logical time
//!   is strictly lower than the fact's. Ties keep the stored fact.
//! - Message kind is stored alongside but never compared for ordering.
//! - [`OperationBook::get`] only answers for the kind currently in the slot,
//!   so older facts of another kind cannot be retrieved.
//! - Slots are evicted by local receipt age in [`OperationBook::cleanup`];
//!   eviction never influences ordering of facts already applied.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::clock::LogicalTime;

/// Kind of membership fact carried by a gossip message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Node joined or re-asserted that it is alive
    Join = 0x01,
    /// Node changed its tags or protocol versions
    Update = 0x02,
    /// Node left gracefully
    Leave = 0x03,
    /// Node was declared failed
    Failed = 0x04,
}

impl MessageKind {
    /// Whether facts of this kind make a member gone
    pub const fn is_departure(self) -> bool {
        matches!(self, Self::Leave | Self::Failed)
    }
}

impl core::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            MessageKind::Join => "join",
            MessageKind::Update => "update",
            MessageKind::Leave => "leave",
            MessageKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Latest accepted fact about one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberOperation<K = MessageKind> {
    /// Kind of the fact
    pub kind: K,
    /// Logical time the fact carried
    pub message_time: LogicalTime,
    /// Local receipt instant, used for eviction only
    pub receive_time: Instant,
}

/// Per-node record of the newest accepted fact.
///
/// Generic over the kind tag so transports with their own message enums can
/// reuse the gate unchanged.
#[derive(Debug, Clone)]
pub struct OperationBook<K = MessageKind> {
    operations: HashMap<String, MemberOperation<K>>,
    timeout: Duration,
}

impl<K: Copy + Eq> OperationBook<K> {
    /// Create an empty book whose slots expire `timeout` after receipt
    pub fn new(timeout: Duration) -> Self {
        Self {
            operations: HashMap::new(),
            timeout,
        }
    }

    /// Record a fact received now. See [`save_at`](Self::save_at).
    pub fn save(&mut self, kind: K, node: &str, message_time: LogicalTime) -> bool {
        self.save_at(kind, node, message_time, Instant::now())
    }

    /// Record a fact received at `now`.
    ///
    /// Returns `true` if the fact is newer than anything seen for `node` and
    /// should be applied; `false` if it is stale or a duplicate, in which case
    /// the book is left untouched.
    pub fn save_at(
        &mut self,
        kind: K,
        node: &str,
        message_time: LogicalTime,
        now: Instant,
    ) -> bool {
        if let Some(existing) = self.operations.get(node) {
            if message_time <= existing.message_time {
                return false;
            }
        }

        self.operations.insert(
            node.to_owned(),
            MemberOperation {
                kind,
                message_time,
                receive_time: now,
            },
        );
        true
    }

    /// Logical time of the stored fact for `node`, if it is of `kind`.
    ///
    /// `None` both when nothing is stored and when a fact of a different kind
    /// occupies the slot.
    pub fn get(&self, node: &str, kind: K) -> Option<LogicalTime> {
        match self.operations.get(node) {
            Some(operation) if operation.kind == kind => Some(operation.message_time),
            _ => None,
        }
    }

    /// Full slot for `node`, regardless of kind
    pub fn slot(&self, node: &str) -> Option<&MemberOperation<K>> {
        self.operations.get(node)
    }

    /// Drop slots received more than `timeout` before `now`.
    ///
    /// Returns the number of slots evicted.
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let before = self.operations.len();
        let timeout = self.timeout;
        self.operations
            .retain(|_, operation| now.saturating_duration_since(operation.receive_time) <= timeout);
        before - self.operations.len()
    }

    /// Number of nodes with a slot
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no slots are held
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Receipt age after which slots are evicted
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
