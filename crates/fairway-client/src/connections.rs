//! Which friends are reachable right now, and over which peer.
//!
//! Owned by the node actor. Tracks per-friend connectivity, the open
//! connection of every identified friend, and connections whose golfer is
//! not yet known (inbound, before their first snapshot).

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use libp2p::PeerId;
use serde::Serialize;

use fairway_shared::GolferId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Unknown,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug)]
pub struct ConnectionTable {
    status: HashMap<GolferId, (Connectivity, Instant)>,
    open: HashMap<GolferId, PeerId>,
    by_peer: HashMap<PeerId, GolferId>,
    unidentified: HashSet<PeerId>,
    /// After this long a `Connecting` attempt no longer blocks a new one.
    attempt_ttl: Duration,
}

impl ConnectionTable {
    pub fn new(attempt_ttl: Duration) -> Self {
        Self {
            status: HashMap::new(),
            open: HashMap::new(),
            by_peer: HashMap::new(),
            unidentified: HashSet::new(),
            attempt_ttl,
        }
    }

    pub fn status(&self, id: &GolferId) -> Connectivity {
        self.status
            .get(id)
            .map(|(state, _)| *state)
            .unwrap_or(Connectivity::Unknown)
    }

    /// Claim a connection attempt to `id`. Returns `false` when the friend
    /// is connected or another attempt is still in flight.
    pub fn begin_attempt(&mut self, id: &GolferId, now: Instant) -> bool {
        match self.status.get(id) {
            Some((Connectivity::Connected, _)) => false,
            Some((Connectivity::Connecting, since))
                if now.saturating_duration_since(*since) < self.attempt_ttl =>
            {
                false
            }
            _ => {
                self.status
                    .insert(id.clone(), (Connectivity::Connecting, now));
                true
            }
        }
    }

    /// Like [`Self::begin_attempt`] but ignores an attempt in flight.
    /// Used for user-initiated reconnects.
    pub fn force_attempt(&mut self, id: &GolferId, now: Instant) -> bool {
        if self.status(id) == Connectivity::Connected {
            return false;
        }
        self.status
            .insert(id.clone(), (Connectivity::Connecting, now));
        true
    }

    /// A transport connection opened to a peer we cannot name yet.
    pub fn on_open(&mut self, peer: PeerId) {
        if !self.by_peer.contains_key(&peer) {
            self.unidentified.insert(peer);
        }
    }

    /// Bind `peer` to `id` as that friend's live connection.
    ///
    /// Returns the friend's previous peer if it differs; the caller closes
    /// it (last successful open wins).
    pub fn identify(&mut self, id: GolferId, peer: PeerId, now: Instant) -> Option<PeerId> {
        self.unidentified.remove(&peer);

        if let Some(previous) = self.by_peer.insert(peer, id.clone()) {
            if previous != id && self.open.get(&previous) == Some(&peer) {
                self.open.remove(&previous);
                self.status
                    .insert(previous, (Connectivity::Disconnected, now));
            }
        }

        self.status
            .insert(id.clone(), (Connectivity::Connected, now));
        match self.open.insert(id, peer) {
            Some(old) if old != peer => {
                self.by_peer.remove(&old);
                Some(old)
            }
            _ => None,
        }
    }

    /// The transport to `peer` is gone. Returns the friend that went
    /// offline, if `peer` was that friend's live connection.
    pub fn on_disconnected(&mut self, peer: &PeerId, now: Instant) -> Option<GolferId> {
        self.unidentified.remove(peer);
        let id = self.by_peer.remove(peer)?;
        if self.open.get(&id) != Some(peer) {
            return None;
        }
        self.open.remove(&id);
        self.status
            .insert(id.clone(), (Connectivity::Disconnected, now));
        Some(id)
    }

    pub fn on_dial_failed(&mut self, id: &GolferId, now: Instant) {
        if self.status(id) == Connectivity::Connecting {
            self.status
                .insert(id.clone(), (Connectivity::Disconnected, now));
        }
    }

    /// Drop everything known about `id`, returning its open peer.
    pub fn forget(&mut self, id: &GolferId) -> Option<PeerId> {
        self.status.remove(id);
        let peer = self.open.remove(id)?;
        self.by_peer.remove(&peer);
        Some(peer)
    }

    pub fn peer_of(&self, id: &GolferId) -> Option<PeerId> {
        self.open.get(id).copied()
    }

    /// Every open connection, identified or not.
    pub fn open_peers(&self) -> Vec<PeerId> {
        self.open
            .values()
            .chain(self.unidentified.iter())
            .copied()
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.open.len()
    }

    pub fn clear(&mut self) {
        self.status.clear();
        self.open.clear();
        self.by_peer.clear();
        self.unidentified.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> GolferId {
        GolferId::parse(s).unwrap()
    }

    #[test]
    fn test_attempts_are_deduplicated() {
        let ttl = Duration::from_secs(60);
        let mut table = ConnectionTable::new(ttl);
        let alex = id("GF-ALEX0001");
        let t0 = Instant::now();

        assert_eq!(table.status(&alex), Connectivity::Unknown);
        assert!(table.begin_attempt(&alex, t0));
        assert!(!table.begin_attempt(&alex, t0 + Duration::from_secs(1)));
        assert_eq!(table.status(&alex), Connectivity::Connecting);

        // a hung attempt stops blocking after the ttl
        assert!(table.begin_attempt(&alex, t0 + ttl));
    }

    #[test]
    fn test_connected_friend_is_not_redialed() {
        let mut table = ConnectionTable::new(Duration::from_secs(60));
        let alex = id("GF-ALEX0001");
        let now = Instant::now();

        table.identify(alex.clone(), PeerId::random(), now);
        assert!(!table.begin_attempt(&alex, now));
        assert!(!table.force_attempt(&alex, now));
    }

    #[test]
    fn test_dial_failure_then_retry() {
        let mut table = ConnectionTable::new(Duration::from_secs(60));
        let alex = id("GF-ALEX0001");
        let now = Instant::now();

        assert!(table.begin_attempt(&alex, now));
        table.on_dial_failed(&alex, now);
        assert_eq!(table.status(&alex), Connectivity::Disconnected);
        assert!(table.begin_attempt(&alex, now));
    }

    #[test]
    fn test_inbound_identified_later() {
        let mut table = ConnectionTable::new(Duration::from_secs(60));
        let alex = id("GF-ALEX0001");
        let peer = PeerId::random();
        let now = Instant::now();

        table.on_open(peer);
        assert_eq!(table.open_peers(), vec![peer]);
        assert_eq!(table.connected_count(), 0);

        assert_eq!(table.identify(alex.clone(), peer, now), None);
        assert_eq!(table.open_peers(), vec![peer]);
        assert_eq!(table.peer_of(&alex), Some(peer));
        assert_eq!(table.status(&alex), Connectivity::Connected);
    }

    #[test]
    fn test_last_open_wins() {
        let mut table = ConnectionTable::new(Duration::from_secs(60));
        let alex = id("GF-ALEX0001");
        let (first, second) = (PeerId::random(), PeerId::random());
        let now = Instant::now();

        table.identify(alex.clone(), first, now);
        assert_eq!(table.identify(alex.clone(), second, now), Some(first));
        assert_eq!(table.open_peers(), vec![second]);

        // closing the superseded connection does not take the friend offline
        assert_eq!(table.on_disconnected(&first, now), None);
        assert_eq!(table.status(&alex), Connectivity::Connected);

        assert_eq!(table.on_disconnected(&second, now), Some(alex.clone()));
        assert_eq!(table.status(&alex), Connectivity::Disconnected);
        assert!(table.open_peers().is_empty());
    }

    #[test]
    fn test_forget_and_clear() {
        let mut table = ConnectionTable::new(Duration::from_secs(60));
        let alex = id("GF-ALEX0001");
        let peer = PeerId::random();
        let now = Instant::now();

        table.identify(alex.clone(), peer, now);
        table.on_open(PeerId::random());
        assert_eq!(table.forget(&alex), Some(peer));
        assert_eq!(table.status(&alex), Connectivity::Unknown);
        assert_eq!(table.open_peers().len(), 1);

        table.clear();
        assert!(table.open_peers().is_empty());
    }
}
