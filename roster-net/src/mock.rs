//! Mock transport for testing
//!
//! `MockTransport` is an in-memory inbox/outbox. `MockNetwork` queues
//! envelopes between named nodes and can hand them back shuffled and
//! duplicated, the way an unreliable gossip fabric would.

use std::collections::VecDeque;
use std::net::SocketAddr;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::RngCore;

use crate::traits::GossipTransport;
use crate::{Error, Result};

/// Mock transport for testing without real networking
#[derive(Debug, Default)]
pub struct MockTransport {
    inbox: Mutex<VecDeque<(SocketAddr, Vec<u8>)>>,
    outbox: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    /// Fail every send when set
    pub fail_sends: bool,
}

impl MockTransport {
    /// Create an empty mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail
    pub fn with_failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Queue a message for the next `recv`
    pub fn push_inbound(&self, from: SocketAddr, msg: Vec<u8>) {
        self.inbox.lock().push_back((from, msg));
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.outbox.lock().clone()
    }

    /// Number of messages waiting to be received
    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }
}

#[async_trait::async_trait]
impl GossipTransport for MockTransport {
    async fn send(&self, to: SocketAddr, msg: &[u8]) -> Result<()> {
        if self.fail_sends {
            return Err(Error::SendFailed);
        }
        self.outbox.lock().push((to, msg.to_vec()));
        Ok(())
    }

    async fn recv(&self) -> Result<(SocketAddr, Vec<u8>)> {
        self.inbox.lock().pop_front().ok_or(Error::Closed)
    }
}

/// A queue of in-flight messages between named nodes
#[derive(Debug, Default)]
pub struct MockNetwork {
    /// Messages in transit: (from, to, payload)
    pub messages: VecDeque<(String, String, Vec<u8>)>,
}

impl MockNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for delivery
    pub fn send(&mut self, from: &str, to: &str, msg: Vec<u8>) {
        self.messages
            .push_back((from.to_owned(), to.to_owned(), msg));
    }

    /// Deliver the next message for a node, in order
    pub fn receive(&mut self, node: &str) -> Option<(String, Vec<u8>)> {
        let idx = self.messages.iter().position(|(_, to, _)| to == node)?;
        let (from, _, msg) = self.messages.remove(idx)?;
        Some((from, msg))
    }

    /// Drain everything addressed to `node` in random order.
    ///
    /// Every `duplicate_every`-th message is delivered twice; pass 0 to
    /// disable duplication.
    pub fn drain_shuffled<R: RngCore>(
        &mut self,
        node: &str,
        rng: &mut R,
        duplicate_every: usize,
    ) -> Vec<(String, Vec<u8>)> {
        let mut delivered = Vec::new();
        let mut remaining = VecDeque::new();
        for (from, to, msg) in self.messages.drain(..) {
            if to == node {
                delivered.push((from, msg));
            } else {
                remaining.push_back((from, to, msg));
            }
        }
        self.messages = remaining;

        if duplicate_every > 0 {
            let duplicates: Vec<_> = delivered
                .iter()
                .step_by(duplicate_every)
                .cloned()
                .collect();
            delivered.extend(duplicates);
        }
        delivered.shuffle(rng);
        delivered
    }

    /// Number of messages in transit
    pub fn in_flight(&self) -> usize {
        self.messages.len()
    }
}
