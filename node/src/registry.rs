//! Peer registry — the set of live connections, keyed by remote address.
//!
//! Shared between the transport callbacks (which register and deregister
//! peers) and the replication engine (which looks up senders and iterates
//! for broadcasts). All access goes through the owning mutex.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use brook_network::TcpPeer;

/// Registry of connected peers. Iteration order is unspecified; nothing
/// may rely on it.
pub struct PeerRegistry {
    peers: HashMap<SocketAddr, Arc<TcpPeer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Register a peer under its remote address. A previous entry for the
    /// same address is replaced.
    pub fn insert(&mut self, peer: Arc<TcpPeer>) {
        self.peers.insert(peer.addr(), peer);
    }

    /// Deregister a peer, returning it if present.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Arc<TcpPeer>> {
        self.peers.remove(addr)
    }

    /// Look up a peer by its remote address.
    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<TcpPeer>> {
        self.peers.get(addr).cloned()
    }

    /// Snapshot of all registered peers, for fan-out outside the lock.
    pub fn peers(&self) -> Vec<Arc<TcpPeer>> {
        self.peers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_network::Direction;
    use tokio::net::{TcpListener, TcpStream};

    async fn peer() -> (Arc<TcpPeer>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (
            Arc::new(TcpPeer::new(server, Direction::Accepted).unwrap()),
            client,
        )
    }

    #[tokio::test]
    async fn insert_then_get_by_address() {
        let (p, _client) = peer().await;
        let mut registry = PeerRegistry::new();

        registry.insert(Arc::clone(&p));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&p.addr()).is_some());
    }

    #[tokio::test]
    async fn remove_deregisters() {
        let (p, _client) = peer().await;
        let mut registry = PeerRegistry::new();

        registry.insert(Arc::clone(&p));
        assert!(registry.remove(&p.addr()).is_some());
        assert!(registry.is_empty());
        assert!(registry.get(&p.addr()).is_none());
    }

    #[tokio::test]
    async fn snapshot_contains_all_peers() {
        let (p1, _c1) = peer().await;
        let (p2, _c2) = peer().await;
        let mut registry = PeerRegistry::new();

        registry.insert(p1);
        registry.insert(p2);
        assert_eq!(registry.peers().len(), 2);
    }
}
