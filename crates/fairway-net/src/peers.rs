//! Peer connection tracking.
//!
//! Maintains an in-memory map of connected peers, their addresses, whether
//! the connection is direct or relayed, and whether the peer has confirmed
//! it speaks the sync protocol.

use std::collections::HashMap;

use libp2p::{Multiaddr, PeerId};
use tracing::debug;

/// How a peer is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Direct,
    Relayed,
    Disconnected,
}

/// Information about a connected peer.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// The peer's libp2p ID.
    pub peer_id: PeerId,
    /// The multiaddr through which we are connected.
    pub address: Multiaddr,
    /// Whether the connection is direct or via a relay.
    pub mode: ConnectionMode,
    /// Identify reported the sync protocol for this peer.
    pub sync_ready: bool,
    /// Timestamp of when the connection was established (Unix epoch millis).
    pub connected_at: u64,
}

/// Tracks all currently connected peers.
#[derive(Debug, Clone, Default)]
pub struct PeerTracker {
    peers: HashMap<PeerId, ConnectionInfo>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly established connection.
    ///
    /// A second connection to the same peer (e.g. a DCUtR upgrade from a
    /// relayed to a direct path) replaces the address and mode but keeps
    /// the sync readiness already learned.
    pub fn on_connected(&mut self, peer_id: PeerId, address: Multiaddr, is_relayed: bool) {
        let mode = if is_relayed {
            ConnectionMode::Relayed
        } else {
            ConnectionMode::Direct
        };

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        debug!(
            peer = %peer_id,
            addr = %address,
            mode = ?mode,
            "Tracking new peer connection"
        );

        let sync_ready = self.peers.get(&peer_id).is_some_and(|info| info.sync_ready);
        self.peers.insert(
            peer_id,
            ConnectionInfo {
                peer_id,
                address,
                mode,
                sync_ready,
                connected_at: now,
            },
        );
    }

    /// Mark a connected peer as speaking the sync protocol.
    ///
    /// Returns `true` only on the transition, so callers announce each
    /// usable connection once.
    pub fn mark_sync_ready(&mut self, peer_id: &PeerId) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(info) if !info.sync_ready => {
                info.sync_ready = true;
                true
            }
            _ => false,
        }
    }

    /// Remove a peer that has fully disconnected, returning what was known.
    pub fn on_disconnected(&mut self, peer_id: &PeerId) -> Option<ConnectionInfo> {
        let removed = self.peers.remove(peer_id);
        if removed.is_some() {
            debug!(peer = %peer_id, "Removed peer from tracker");
        }
        removed
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&ConnectionInfo> {
        self.peers.get(peer_id)
    }

    pub fn connection_mode(&self, peer_id: &PeerId) -> ConnectionMode {
        self.peers
            .get(peer_id)
            .map(|info| info.mode)
            .unwrap_or(ConnectionMode::Disconnected)
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn is_sync_ready(&self, peer_id: &PeerId) -> bool {
        self.peers.get(peer_id).is_some_and(|info| info.sync_ready)
    }

    /// Peers that are connected and speak the sync protocol.
    pub fn sync_peers(&self) -> Vec<PeerId> {
        self.peers
            .values()
            .filter(|info| info.sync_ready)
            .map(|info| info.peer_id)
            .collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> Multiaddr {
        "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap()
    }

    #[test]
    fn test_connect_disconnect() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();

        assert!(!tracker.is_connected(&peer));
        tracker.on_connected(peer, test_addr(), false);
        assert!(tracker.is_connected(&peer));
        assert_eq!(tracker.connection_mode(&peer), ConnectionMode::Direct);

        assert!(tracker.on_disconnected(&peer).is_some());
        assert!(!tracker.is_connected(&peer));
        assert_eq!(tracker.connection_mode(&peer), ConnectionMode::Disconnected);
        assert!(tracker.on_disconnected(&peer).is_none());
    }

    #[test]
    fn test_sync_ready_transition_reported_once() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();

        assert!(!tracker.mark_sync_ready(&peer), "unknown peer");
        tracker.on_connected(peer, test_addr(), true);
        assert!(tracker.sync_peers().is_empty());

        assert!(tracker.mark_sync_ready(&peer));
        assert!(!tracker.mark_sync_ready(&peer));
        assert_eq!(tracker.sync_peers(), vec![peer]);
    }

    #[test]
    fn test_upgrade_keeps_sync_ready() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();
        let direct: Multiaddr = "/ip4/192.168.1.1/udp/4001/quic-v1".parse().unwrap();

        tracker.on_connected(peer, test_addr(), true);
        tracker.mark_sync_ready(&peer);
        tracker.on_connected(peer, direct.clone(), false);

        assert_eq!(tracker.connection_mode(&peer), ConnectionMode::Direct);
        assert!(tracker.is_sync_ready(&peer));
        assert_eq!(tracker.get(&peer).unwrap().address, direct);
        assert_eq!(tracker.peer_count(), 1);
    }
}
