//! Transport traits
//!
//! Framing, retransmission and failure detection live behind this trait;
//! the membership engine only sees decoded facts.

use std::net::SocketAddr;

use crate::Result;

/// Datagram-style transport used to exchange gossip
#[async_trait::async_trait]
pub trait GossipTransport: Send + Sync {
    /// Send a message to a peer's gossip address
    async fn send(&self, to: SocketAddr, msg: &[u8]) -> Result<()>;

    /// Receive the next message and the address it came from
    async fn recv(&self) -> Result<(SocketAddr, Vec<u8>)>;
}

#[async_trait::async_trait]
impl<T: GossipTransport + ?Sized> GossipTransport for std::sync::Arc<T> {
    async fn send(&self, to: SocketAddr, msg: &[u8]) -> Result<()> {
        (**self).send(to, msg).await
    }

    async fn recv(&self) -> Result<(SocketAddr, Vec<u8>)> {
        (**self).recv().await
    }
}
