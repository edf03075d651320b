//! In-process network with the same command/notification contract as the
//! libp2p swarm.
//!
//! Each endpoint gets a [`SwarmHandle`] whose task answers `Dial`, `Send`,
//! `Disconnect`, `GetPeers` and `Shutdown` against a shared hub. Used to
//! run several nodes inside one test without sockets.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use libp2p::{Multiaddr, PeerId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::swarm::{SwarmCommand, SwarmHandle, SwarmNotification};

#[derive(Default)]
struct Hub {
    endpoints: HashMap<PeerId, mpsc::Sender<SwarmNotification>>,
    links: HashSet<(PeerId, PeerId)>,
}

fn link_key(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Hub {
    fn is_linked(&self, a: PeerId, b: PeerId) -> bool {
        self.links.contains(&link_key(a, b))
    }

    fn linked_to(&self, peer: PeerId) -> Vec<PeerId> {
        self.links
            .iter()
            .filter_map(|&(a, b)| match (a == peer, b == peer) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect()
    }

    fn sender(&self, peer: &PeerId) -> Option<mpsc::Sender<SwarmNotification>> {
        self.endpoints.get(peer).cloned()
    }
}

type Outbox = Vec<(mpsc::Sender<SwarmNotification>, SwarmNotification)>;

/// Shared in-memory network. Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        // A panicking test thread must not take the whole hub down with it
        self.hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bring `peer_id` online and return its handle. Must be called within
    /// a tokio runtime.
    pub fn endpoint(&self, peer_id: PeerId) -> SwarmHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SwarmCommand>(256);
        let (notif_tx, notif_rx) = mpsc::channel::<SwarmNotification>(256);
        self.lock().endpoints.insert(peer_id, notif_tx);

        let task = tokio::spawn(self.clone().run(peer_id, cmd_rx));
        SwarmHandle {
            cmd_tx,
            notif_rx,
            local_peer_id: peer_id,
            task,
        }
    }

    pub fn is_online(&self, peer_id: &PeerId) -> bool {
        self.lock().endpoints.contains_key(peer_id)
    }

    pub fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.lock().is_linked(*a, *b)
    }

    /// Deliver a raw payload to `to` as if `from` had sent it, whether or
    /// not the two are linked.
    pub async fn inject(&self, from: PeerId, to: PeerId, payload: serde_json::Value) {
        let sender = self.lock().sender(&to);
        if let Some(tx) = sender {
            let _ = tx
                .send(SwarmNotification::MessageReceived {
                    peer_id: from,
                    payload,
                })
                .await;
        }
    }

    /// Drop the link between two peers, notifying both sides.
    pub async fn sever(&self, a: PeerId, b: PeerId) {
        let outbox = self.unlink(a, b);
        deliver(outbox).await;
    }

    fn unlink(&self, a: PeerId, b: PeerId) -> Outbox {
        let mut hub = self.lock();
        if !hub.links.remove(&link_key(a, b)) {
            return Vec::new();
        }
        [(a, b), (b, a)]
            .into_iter()
            .filter_map(|(to, peer_id)| {
                hub.sender(&to)
                    .map(|tx| (tx, SwarmNotification::PeerDisconnected { peer_id }))
            })
            .collect()
    }

    async fn run(self, local: PeerId, mut cmd_rx: mpsc::Receiver<SwarmCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            let outbox = match cmd {
                SwarmCommand::Dial(target) => self.dial(local, target),
                SwarmCommand::Send { peer_id, payload } => self.send(local, peer_id, payload),
                SwarmCommand::Disconnect(peer_id) => self.unlink(local, peer_id),
                SwarmCommand::GetPeers(reply) => {
                    let _ = reply.send(self.lock().linked_to(local));
                    Vec::new()
                }
                SwarmCommand::Shutdown => break,
            };
            deliver(outbox).await;
        }

        let outbox = self.go_offline(local);
        deliver(outbox).await;
        debug!(peer = %local, "Memory endpoint stopped");
    }

    fn dial(&self, local: PeerId, target: PeerId) -> Outbox {
        let mut hub = self.lock();
        let Some(own_tx) = hub.sender(&local) else {
            return Vec::new();
        };
        let Some(target_tx) = hub.sender(&target).filter(|_| target != local) else {
            return vec![(
                own_tx,
                SwarmNotification::DialFailed {
                    peer_id: target,
                    error: "peer unreachable".to_string(),
                },
            )];
        };

        let connected = |peer_id| SwarmNotification::PeerConnected {
            peer_id,
            address: Multiaddr::empty(),
        };
        if !hub.links.insert(link_key(local, target)) {
            // Already linked: only the dialer hears about it again
            return vec![(own_tx, connected(target))];
        }
        vec![(own_tx, connected(target)), (target_tx, connected(local))]
    }

    fn send(&self, local: PeerId, target: PeerId, payload: serde_json::Value) -> Outbox {
        let hub = self.lock();
        match hub.sender(&target).filter(|_| hub.is_linked(local, target)) {
            Some(tx) => vec![(
                tx,
                SwarmNotification::MessageReceived {
                    peer_id: local,
                    payload,
                },
            )],
            None => {
                debug!(from = %local, to = %target, "Dropping payload for unlinked peer");
                Vec::new()
            }
        }
    }

    fn go_offline(&self, local: PeerId) -> Outbox {
        let mut hub = self.lock();
        hub.endpoints.remove(&local);
        let peers = hub.linked_to(local);
        hub.links.retain(|&(a, b)| a != local && b != local);
        peers
            .into_iter()
            .filter_map(|peer| {
                hub.sender(&peer).map(|tx| {
                    (
                        tx,
                        SwarmNotification::PeerDisconnected { peer_id: local },
                    )
                })
            })
            .collect()
    }
}

async fn deliver(outbox: Outbox) {
    for (tx, notification) in outbox {
        let _ = tx.send(notification).await;
    }
}
