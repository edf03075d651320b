//! Main swarm orchestration with tokio mpsc command/notification pattern.
//!
//! The swarm event loop runs in a dedicated tokio task. External code
//! communicates with it through typed command and notification channels,
//! keeping the networking layer fully asynchronous and decoupled.
//!
//! Peers are addressed by `PeerId` only. Addresses come from the relay (if
//! configured), from Kademlia lookups, or from whatever the swarm already
//! knows.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use libp2p::{
    identify, kad,
    multiaddr::Protocol,
    relay, request_response,
    swarm::{dial_opts::DialOpts, DialError, SwarmEvent},
    Multiaddr, PeerId, Swarm,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::behaviour::{FairwayBehaviour, FairwayEvent};
use crate::discovery::load_bootstrap_peers;
use crate::peers::PeerTracker;
use crate::relay::{build_circuit_addr, build_relayed_addr, extract_peer_id, split_relay_addr};
use crate::transport::build_swarm;

use fairway_shared::constants::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_QUIC_PORT, SYNC_PROTOCOL};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Open a connection to a peer. Answered by `PeerConnected` or
    /// `DialFailed`.
    Dial(PeerId),
    /// Deliver a JSON payload to a connected peer.
    Send {
        peer_id: PeerId,
        payload: serde_json::Value,
    },
    /// Close every connection to a peer.
    Disconnect(PeerId),
    /// Request a snapshot of peers ready for sync.
    GetPeers(oneshot::Sender<Vec<PeerId>>),
    /// Gracefully shut down the swarm.
    Shutdown,
}

/// Notifications sent *from* the swarm task to the application.
#[derive(Debug, Clone)]
pub enum SwarmNotification {
    /// A peer is connected and speaks the sync protocol.
    PeerConnected { peer_id: PeerId, address: Multiaddr },
    /// A previously announced peer went away.
    PeerDisconnected { peer_id: PeerId },
    /// A dial could not be completed.
    DialFailed { peer_id: PeerId, error: String },
    /// A sync payload arrived. The payload is untrusted.
    MessageReceived {
        peer_id: PeerId,
        payload: serde_json::Value,
    },
}

/// Configuration for spawning the swarm.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Path to the bootstrap peers configuration file.
    pub bootstrap_peers_path: Option<PathBuf>,
    /// Port to listen on (defaults to `DEFAULT_QUIC_PORT`).
    pub listen_port: u16,
    /// Relay to reserve a slot at and dial friends through. Must end in
    /// `/p2p/<relay peer id>`.
    pub relay_addr: Option<Multiaddr>,
    /// How long an unused connection stays open.
    pub idle_timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            bootstrap_peers_path: None,
            listen_port: DEFAULT_QUIC_PORT,
            relay_addr: None,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

/// A running network endpoint: command sender, notification receiver and
/// the task driving it.
#[derive(Debug)]
pub struct SwarmHandle {
    pub cmd_tx: mpsc::Sender<SwarmCommand>,
    pub notif_rx: mpsc::Receiver<SwarmNotification>,
    pub local_peer_id: PeerId,
    pub task: JoinHandle<()>,
}

/// Spawn the libp2p swarm in a background tokio task.
///
/// # Arguments
///
/// * `keypair` - The node's identity keypair
/// * `config` - Swarm configuration (bootstrap peers, listen port, relay)
pub async fn spawn_swarm(
    keypair: libp2p::identity::Keypair,
    config: SwarmConfig,
) -> anyhow::Result<SwarmHandle> {
    let mut swarm =
        build_swarm(keypair, config.idle_timeout).context("cannot build libp2p swarm")?;
    let local_peer_id = *swarm.local_peer_id();

    // Listen on QUIC; IPv6 is optional
    let listen_addr_v4: Multiaddr =
        format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port).parse()?;
    let listen_addr_v6: Multiaddr =
        format!("/ip6/::/udp/{}/quic-v1", config.listen_port).parse()?;

    swarm
        .listen_on(listen_addr_v4.clone())
        .with_context(|| format!("cannot listen on {listen_addr_v4}"))?;
    if let Err(e) = swarm.listen_on(listen_addr_v6.clone()) {
        warn!(addr = %listen_addr_v6, error = %e, "IPv6 listener unavailable");
    }

    info!(peer_id = %local_peer_id, port = config.listen_port, "Swarm listening");

    if let Some(ref path) = config.bootstrap_peers_path {
        bootstrap(&mut swarm, &load_bootstrap_peers(path));
    }

    let relay = config.relay_addr.as_ref().and_then(|addr| {
        let split = split_relay_addr(addr);
        if split.is_none() {
            warn!(addr = %addr, "Relay address has no /p2p/ component, ignoring relay");
        }
        split
    });
    if let Some((ref base, ref relay_peer)) = relay {
        reserve_relay_slot(&mut swarm, base, relay_peer);
    }

    let (cmd_tx, cmd_rx) = mpsc::channel::<SwarmCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<SwarmNotification>(256);

    let event_loop = EventLoop {
        swarm,
        relay,
        notif_tx,
        tracker: PeerTracker::new(),
        pending_lookups: HashMap::new(),
    };
    let task = tokio::spawn(event_loop.run(cmd_rx));

    Ok(SwarmHandle {
        cmd_tx,
        notif_rx,
        local_peer_id,
        task,
    })
}

fn bootstrap(swarm: &mut Swarm<FairwayBehaviour>, addrs: &[Multiaddr]) {
    for addr in addrs {
        if let Err(e) = swarm.dial(addr.clone()) {
            warn!(addr = %addr, error = %e, "Failed to dial bootstrap peer");
            continue;
        }
        if let Some(peer_id) = extract_peer_id(addr) {
            swarm
                .behaviour_mut()
                .kademlia
                .add_address(&peer_id, addr.clone());
        }
        debug!(addr = %addr, "Dialing bootstrap peer");
    }

    if !addrs.is_empty() {
        if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
            warn!(error = %e, "Kademlia bootstrap failed to start");
        }
    }
}

fn reserve_relay_slot(swarm: &mut Swarm<FairwayBehaviour>, base: &Multiaddr, relay_peer: &PeerId) {
    let relay_addr = base.clone().with(Protocol::P2p(*relay_peer));
    swarm
        .behaviour_mut()
        .kademlia
        .add_address(relay_peer, base.clone());
    if let Err(e) = swarm.dial(relay_addr.clone()) {
        warn!(addr = %relay_addr, error = %e, "Failed to dial relay");
        return;
    }

    // The reservation is requested once the swarm listens on the circuit
    let circuit_addr = build_circuit_addr(base, relay_peer);
    info!(relay = %relay_peer, addr = %circuit_addr, "Requesting relay reservation");
    if let Err(e) = swarm.listen_on(circuit_addr) {
        warn!(relay = %relay_peer, error = %e, "Failed to listen on relay circuit");
    }
}

struct EventLoop {
    swarm: Swarm<FairwayBehaviour>,
    relay: Option<(Multiaddr, PeerId)>,
    notif_tx: mpsc::Sender<SwarmNotification>,
    tracker: PeerTracker,
    /// Kademlia lookups started because a dial had no addresses.
    pending_lookups: HashMap<kad::QueryId, PeerId>,
}

impl EventLoop {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SwarmCommand>) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Shutdown) => {
                            info!("Swarm shutdown requested");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("Command channel closed, shutting down swarm");
                            break;
                        }
                    }
                }

                event = self.swarm.select_next_some() => self.handle_event(event).await,
            }
        }

        info!("Swarm event loop terminated");
    }

    async fn notify(&mut self, notification: SwarmNotification) {
        if self.notif_tx.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
        }
    }

    async fn handle_command(&mut self, cmd: SwarmCommand) {
        match cmd {
            SwarmCommand::Dial(peer_id) => self.dial(peer_id).await,
            SwarmCommand::Send { peer_id, payload } => {
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .sync
                    .send_request(&peer_id, payload);
                debug!(peer = %peer_id, request = %request_id, "Sync payload queued");
            }
            SwarmCommand::Disconnect(peer_id) => {
                if self.swarm.disconnect_peer_id(peer_id).is_err() {
                    debug!(peer = %peer_id, "Disconnect requested for unconnected peer");
                }
            }
            SwarmCommand::GetPeers(reply) => {
                let _ = reply.send(self.tracker.sync_peers());
            }
            SwarmCommand::Shutdown => {}
        }
    }

    async fn dial(&mut self, peer_id: PeerId) {
        if self.tracker.is_sync_ready(&peer_id) {
            // Already usable; announce again so the caller can push
            let address = self
                .tracker
                .get(&peer_id)
                .map(|info| info.address.clone())
                .unwrap_or_else(Multiaddr::empty);
            self.notify(SwarmNotification::PeerConnected { peer_id, address })
                .await;
            return;
        }

        let opts = match self.relay {
            Some((ref base, ref relay_peer)) => DialOpts::peer_id(peer_id)
                .addresses(vec![build_relayed_addr(base, relay_peer, &peer_id)])
                .extend_addresses_through_behaviour()
                .build(),
            None => DialOpts::peer_id(peer_id).build(),
        };

        match self.swarm.dial(opts) {
            Ok(()) => debug!(peer = %peer_id, "Dialing peer"),
            Err(DialError::DialPeerConditionFalse(_)) => {
                debug!(peer = %peer_id, "Dial already in progress");
            }
            Err(DialError::NoAddresses) => {
                let query = self.swarm.behaviour_mut().kademlia.get_closest_peers(peer_id);
                debug!(peer = %peer_id, "No known addresses, starting Kademlia lookup");
                self.pending_lookups.insert(query, peer_id);
            }
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "Dial failed");
                self.notify(SwarmNotification::DialFailed {
                    peer_id,
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn lookup_finished(
        &mut self,
        target: PeerId,
        result: Result<kad::GetClosestPeersOk, kad::GetClosestPeersError>,
    ) {
        let found = match result {
            Ok(ok) => ok.peers.into_iter().find(|info| info.peer_id == target),
            Err(e) => {
                debug!(peer = %target, error = %e, "Kademlia lookup failed");
                None
            }
        };

        let Some(info) = found.filter(|info| !info.addrs.is_empty()) else {
            self.notify(SwarmNotification::DialFailed {
                peer_id: target,
                error: "peer not found".to_string(),
            })
            .await;
            return;
        };

        for addr in &info.addrs {
            self.swarm
                .behaviour_mut()
                .kademlia
                .add_address(&target, addr.clone());
        }
        let opts = DialOpts::peer_id(target).addresses(info.addrs).build();
        if let Err(e) = self.swarm.dial(opts) {
            warn!(peer = %target, error = %e, "Dial after lookup failed");
            self.notify(SwarmNotification::DialFailed {
                peer_id: target,
                error: e.to_string(),
            })
            .await;
        }
    }

    async fn handle_event(&mut self, event: SwarmEvent<FairwayEvent>) {
        match event {
            SwarmEvent::Behaviour(FairwayEvent::Sync(event)) => self.handle_sync(event).await,

            SwarmEvent::Behaviour(FairwayEvent::Kademlia(
                kad::Event::OutboundQueryProgressed {
                    id,
                    result: kad::QueryResult::GetClosestPeers(result),
                    ..
                },
            )) => {
                if let Some(target) = self.pending_lookups.remove(&id) {
                    self.lookup_finished(target, result).await;
                }
            }

            SwarmEvent::Behaviour(FairwayEvent::Kademlia(
                kad::Event::OutboundQueryProgressed { result, .. },
            )) => {
                debug!(result = ?result, "Kademlia query progressed");
            }

            SwarmEvent::Behaviour(FairwayEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!(
                    peer = %peer_id,
                    protocol = ?info.protocol_version,
                    "Identify: received info from peer"
                );
                for addr in &info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr.clone());
                }

                let speaks_sync = info.protocols.iter().any(|p| p.as_ref() == SYNC_PROTOCOL);
                if speaks_sync && self.tracker.mark_sync_ready(&peer_id) {
                    let address = self
                        .tracker
                        .get(&peer_id)
                        .map(|c| c.address.clone())
                        .unwrap_or_else(Multiaddr::empty);
                    info!(peer = %peer_id, addr = %address, "Peer ready for sync");
                    self.notify(SwarmNotification::PeerConnected { peer_id, address })
                        .await;
                }
            }

            SwarmEvent::Behaviour(FairwayEvent::RelayClient(
                relay::client::Event::ReservationReqAccepted { relay_peer_id, .. },
            )) => {
                info!(relay = %relay_peer_id, "Relay reservation accepted");
            }

            SwarmEvent::Behaviour(FairwayEvent::Dcutr(event)) => {
                debug!(event = ?event, "DCUtR event");
            }

            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                let addr = endpoint.get_remote_address().clone();
                let is_relayed = addr.iter().any(|p| matches!(p, Protocol::P2pCircuit));
                self.tracker.on_connected(peer_id, addr.clone(), is_relayed);
                info!(peer = %peer_id, addr = %addr, relayed = is_relayed, "Peer connected");
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    let was_ready = self
                        .tracker
                        .on_disconnected(&peer_id)
                        .is_some_and(|info| info.sync_ready);
                    info!(peer = %peer_id, "Peer disconnected");
                    if was_ready {
                        self.notify(SwarmNotification::PeerDisconnected { peer_id })
                            .await;
                    }
                }
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "Listening on new address");
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(peer = ?peer_id, error = %error, "Outgoing connection error");
                if let Some(peer_id) = peer_id {
                    if !self.tracker.is_connected(&peer_id) {
                        self.notify(SwarmNotification::DialFailed {
                            peer_id,
                            error: error.to_string(),
                        })
                        .await;
                    }
                }
            }

            SwarmEvent::IncomingConnectionError { error, .. } => {
                warn!(error = %error, "Incoming connection error");
            }

            _ => {}
        }
    }

    async fn handle_sync(&mut self, event: request_response::Event<serde_json::Value, ()>) {
        match event {
            request_response::Event::Message {
                peer,
                message:
                    request_response::Message::Request {
                        request, channel, ..
                    },
                ..
            } => {
                debug!(peer = %peer, "Sync payload received");
                if self
                    .swarm
                    .behaviour_mut()
                    .sync
                    .send_response(channel, ())
                    .is_err()
                {
                    debug!(peer = %peer, "Receipt not sent, stream closed");
                }
                self.notify(SwarmNotification::MessageReceived {
                    peer_id: peer,
                    payload: request,
                })
                .await;
            }
            request_response::Event::Message { .. } => {}
            request_response::Event::OutboundFailure { peer, error, .. } => {
                warn!(peer = %peer, error = %error, "Sync payload not delivered");
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                debug!(peer = %peer, error = %error, "Inbound sync payload dropped");
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }
}
