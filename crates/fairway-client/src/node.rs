//! The node actor.
//!
//! One task owns the profile state, the connection table, the database and
//! the swarm command channel. It reacts to user commands from
//! [`NodeHandle`], notifications from the network endpoint and the retry
//! timer in a single `tokio::select!` loop. Nothing else mutates state, so
//! every merge is applied atomically with respect to the others.
//!
//! The endpoint is optional. When it cannot be brought up the node keeps
//! serving local commands and tries again on every retry tick.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use libp2p::PeerId;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use fairway_net::{keypair_for, peer_id_for, spawn_swarm, SwarmCommand, SwarmHandle, SwarmNotification};
use fairway_shared::{
    Friend, GolferId, MergeOutcome, ProfileSnapshot, ProtocolError, WireMessage,
};
use fairway_store::Database;

use crate::config::NodeConfig;
use crate::connections::{ConnectionTable, Connectivity};
use crate::error::{ClientError, Result};
use crate::events::{emit_event, NodeEvent, EVENT_CHANNEL_CAPACITY};
use crate::retry::{retry_timer, sweep};
use crate::state::{Action, ProfileState};

/// Requests from [`NodeHandle`] to the actor.
#[derive(Debug)]
pub(crate) enum NodeCommand {
    AddFriend {
        snapshot: ProfileSnapshot,
        reply: oneshot::Sender<MergeOutcome>,
    },
    RemoveFriend {
        id: GolferId,
        reply: oneshot::Sender<bool>,
    },
    Friends {
        reply: oneshot::Sender<Vec<Friend>>,
    },
    Connectivity {
        id: GolferId,
        reply: oneshot::Sender<Connectivity>,
    },
    SyncNow {
        id: GolferId,
        reply: oneshot::Sender<Result<()>>,
    },
    Update {
        action: Action,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        cap: Option<usize>,
        reply: oneshot::Sender<ProfileSnapshot>,
    },
    Shutdown,
}

/// Handle to a running node. Dropping it stops the node; prefer
/// [`NodeHandle::shutdown`] to wait for the network to be released.
#[derive(Debug)]
pub struct NodeHandle {
    cmd_tx: mpsc::Sender<NodeCommand>,
    events: broadcast::Sender<NodeEvent>,
    local_id: GolferId,
    peer_id: PeerId,
    pub(crate) share_base_url: Option<Url>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn local_id(&self) -> &GolferId {
        &self.local_id
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Stream of changes. Slow receivers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Stop the node: the retry timer is cancelled, every connection and
    /// the endpoint are released. Returns once the network task has exited.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(NodeCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "node task ended abnormally");
        }
    }

    pub(crate) async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ClientError::NodeStopped)?;
        reply_rx.await.map_err(|_| ClientError::NodeStopped)
    }
}

pub type LaunchFuture = Pin<Box<dyn Future<Output = anyhow::Result<SwarmHandle>> + Send>>;

/// Brings up a network endpoint. Called again from the retry tick until it
/// succeeds.
pub type EndpointLauncher = Arc<dyn Fn() -> LaunchFuture + Send + Sync>;

/// The receiving half of a running endpoint, held by the actor loop.
struct Endpoint {
    notif_rx: mpsc::Receiver<SwarmNotification>,
    task: JoinHandle<()>,
}

impl Endpoint {
    async fn next(endpoint: &mut Option<Endpoint>) -> Option<SwarmNotification> {
        match endpoint {
            Some(endpoint) => endpoint.notif_rx.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn stop(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "network task ended abnormally");
        }
    }
}

pub struct Node {
    config: NodeConfig,
    db: Database,
    state: ProfileState,
    table: ConnectionTable,
    /// Peer id of every friend, derived from their golfer id.
    friend_peers: HashMap<PeerId, GolferId>,
    /// `None` while no endpoint is up; swarm commands are dropped.
    swarm_tx: Option<mpsc::Sender<SwarmCommand>>,
    launcher: Option<EndpointLauncher>,
    launching: bool,
    launched_tx: mpsc::Sender<anyhow::Result<SwarmHandle>>,
    events: broadcast::Sender<NodeEvent>,
}

impl Node {
    /// Open the database, derive the node key and start the node.
    ///
    /// If the database cannot be opened the node runs on an in-memory one
    /// for this session. Failing to bring up the libp2p endpoint is not
    /// fatal: the node starts offline and keeps retrying in the background.
    pub async fn start(config: NodeConfig) -> Result<NodeHandle> {
        let db = open_database(&config)?;
        let local_id = db.get_or_create_golfer_id()?;
        let keypair = keypair_for(&local_id).map_err(|e| ClientError::Network(e.into()))?;
        let swarm_config = config.swarm_config();
        let launcher: EndpointLauncher = Arc::new(move || -> LaunchFuture {
            let keypair = keypair.clone();
            let swarm_config = swarm_config.clone();
            Box::pin(async move { spawn_swarm(keypair, swarm_config).await })
        });
        Self::start_with_launcher(config, db, launcher)
    }

    /// Start the node on an already running endpoint. Must be called within
    /// a tokio runtime.
    pub fn start_with(config: NodeConfig, db: Database, swarm: SwarmHandle) -> Result<NodeHandle> {
        Self::spawn(config, db, Some(swarm), None)
    }

    /// Start the node offline and bring the endpoint up with `launcher`,
    /// retrying on every retry tick until it succeeds.
    pub fn start_with_launcher(
        config: NodeConfig,
        db: Database,
        launcher: EndpointLauncher,
    ) -> Result<NodeHandle> {
        Self::spawn(config, db, None, Some(launcher))
    }

    fn spawn(
        config: NodeConfig,
        db: Database,
        swarm: Option<SwarmHandle>,
        launcher: Option<EndpointLauncher>,
    ) -> Result<NodeHandle> {
        let local_id = db.get_or_create_golfer_id()?;
        let peer_id = peer_id_for(&local_id).ok_or_else(|| {
            ClientError::Network(anyhow::anyhow!("cannot derive peer id for {local_id}"))
        })?;
        let stored = db.load_state()?;
        let state = ProfileState::from_stored(local_id.clone(), stored);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (launched_tx, launched_rx) = mpsc::channel(1);

        info!(
            golfer_id = %local_id,
            peer_id = %peer_id,
            friends = state.roster().len(),
            "starting node"
        );

        let share_base_url = config.share_base_url.clone();
        let mut node = Node {
            table: ConnectionTable::new(config.retry_interval),
            config,
            db,
            state,
            friend_peers: HashMap::new(),
            swarm_tx: None,
            launcher,
            launching: false,
            launched_tx,
            events: events.clone(),
        };
        node.reindex();

        let task = tokio::spawn(node.run(cmd_rx, launched_rx, swarm));

        Ok(NodeHandle {
            cmd_tx,
            events,
            local_id,
            peer_id,
            share_base_url,
            task,
        })
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<NodeCommand>,
        mut launched_rx: mpsc::Receiver<anyhow::Result<SwarmHandle>>,
        swarm: Option<SwarmHandle>,
    ) {
        let mut retry = retry_timer(self.config.retry_interval);
        let mut endpoint = match swarm {
            Some(swarm) => Some(self.attach(swarm)),
            None => {
                self.launch_endpoint();
                None
            }
        };

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(NodeCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },

                notification = Endpoint::next(&mut endpoint) => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => {
                        warn!("network endpoint stopped, going offline");
                        self.detach();
                        if let Some(stopped) = endpoint.take() {
                            stopped.stop().await;
                        }
                    }
                },

                Some(launched) = launched_rx.recv() => {
                    self.launching = false;
                    match launched {
                        Ok(swarm) => endpoint = Some(self.attach(swarm)),
                        Err(e) => warn!(error = %format!("{e:#}"), "network endpoint unavailable, will retry"),
                    }
                }

                _ = retry.tick() => {
                    if endpoint.is_some() {
                        self.retry_sweep();
                    } else {
                        self.launch_endpoint();
                    }
                }
            }
        }

        self.table.clear();
        if let Some(swarm_tx) = self.swarm_tx.take() {
            let _ = swarm_tx.send(SwarmCommand::Shutdown).await;
        }
        if let Some(endpoint) = endpoint {
            endpoint.stop().await;
        }
        info!(golfer_id = %self.state.local_id(), "node stopped");
    }

    /// Start using a freshly launched endpoint and reach every friend once.
    fn attach(&mut self, swarm: SwarmHandle) -> Endpoint {
        info!(peer_id = %swarm.local_peer_id, "network endpoint up");
        self.swarm_tx = Some(swarm.cmd_tx);
        self.retry_sweep();
        Endpoint {
            notif_rx: swarm.notif_rx,
            task: swarm.task,
        }
    }

    /// Forget every connection of an endpoint that went away.
    fn detach(&mut self) {
        self.swarm_tx = None;
        let online: Vec<GolferId> = self
            .state
            .roster()
            .ids()
            .filter(|id| self.table.status(id) == Connectivity::Connected)
            .cloned()
            .collect();
        self.table.clear();
        for id in online {
            emit_event(&self.events, NodeEvent::PeerOffline { id });
        }
    }

    fn launch_endpoint(&mut self) {
        let Some(launcher) = self.launcher.clone() else {
            return;
        };
        if self.launching {
            return;
        }
        self.launching = true;
        debug!("launching network endpoint");
        let launched_tx = self.launched_tx.clone();
        tokio::spawn(async move {
            // a handle nobody receives is dropped, which stops its swarm
            let _ = launched_tx.send(launcher().await).await;
        });
    }

    fn handle_command(&mut self, cmd: NodeCommand) {
        match cmd {
            NodeCommand::AddFriend { snapshot, reply } => {
                let id = snapshot.id.clone();
                let outcome = self.merge_snapshot(&snapshot);
                self.connect(&id);
                let _ = reply.send(outcome);
            }
            NodeCommand::RemoveFriend { id, reply } => {
                let removed = self.state.remove_friend(&id).is_some();
                if removed {
                    info!(friend = %id, "friend removed");
                    if let Some(peer) = self.table.forget(&id) {
                        self.send_swarm(SwarmCommand::Disconnect(peer));
                    }
                    self.reindex();
                    self.persist();
                    emit_event(&self.events, NodeEvent::FriendRemoved { id });
                }
                let _ = reply.send(removed);
            }
            NodeCommand::Friends { reply } => {
                let _ = reply.send(self.state.roster().to_vec());
            }
            NodeCommand::Connectivity { id, reply } => {
                let _ = reply.send(self.table.status(&id));
            }
            NodeCommand::SyncNow { id, reply } => {
                let _ = reply.send(self.sync_now(&id));
            }
            NodeCommand::Update { action, reply } => {
                let changed = self.state.apply(action);
                if changed {
                    self.persist();
                    self.broadcast_snapshot();
                    emit_event(&self.events, NodeEvent::ProfileChanged);
                }
                let _ = reply.send(changed);
            }
            NodeCommand::Snapshot { cap, reply } => {
                let cap = cap.unwrap_or(self.config.snapshot_rounds);
                let _ = reply.send(self.state.snapshot(cap));
            }
            NodeCommand::Shutdown => {}
        }
    }

    fn handle_notification(&mut self, notification: SwarmNotification) {
        let now = Instant::now();
        match notification {
            SwarmNotification::PeerConnected { peer_id, address } => {
                debug!(peer = %peer_id, addr = %address, "connection open");
                match self.friend_peers.get(&peer_id).cloned() {
                    Some(id) => self.mark_connected(id, peer_id),
                    None => self.table.on_open(peer_id),
                }
                // Both sides push as soon as the connection opens
                self.push_snapshot(peer_id);
            }
            SwarmNotification::PeerDisconnected { peer_id } => {
                if let Some(id) = self.table.on_disconnected(&peer_id, now) {
                    info!(friend = %id, peer = %peer_id, "friend offline");
                    emit_event(&self.events, NodeEvent::PeerOffline { id });
                }
            }
            SwarmNotification::DialFailed { peer_id, error } => {
                if let Some(id) = self.friend_peers.get(&peer_id) {
                    debug!(friend = %id, error = %error, "friend unreachable");
                    self.table.on_dial_failed(id, now);
                }
            }
            SwarmNotification::MessageReceived { peer_id, payload } => {
                self.handle_payload(peer_id, payload);
            }
        }
    }

    fn handle_payload(&mut self, peer_id: PeerId, payload: serde_json::Value) {
        let snapshot = match WireMessage::from_value(payload) {
            Ok(WireMessage::SyncProfile(snapshot)) => snapshot,
            Ok(WireMessage::Unknown(kind)) => {
                debug!(peer = %peer_id, kind = %kind, "ignoring unknown message type");
                return;
            }
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "dropping malformed payload");
                return;
            }
        };

        if &snapshot.id == self.state.local_id() {
            debug!(peer = %peer_id, "dropping snapshot carrying our own id");
            return;
        }
        if peer_id_for(&snapshot.id) != Some(peer_id) {
            let e = ProtocolError::SenderMismatch(snapshot.id.to_string());
            warn!(peer = %peer_id, error = %e, "dropping snapshot");
            return;
        }

        let id = snapshot.id.clone();
        self.merge_snapshot(&snapshot);
        self.mark_connected(id, peer_id);
    }

    fn merge_snapshot(&mut self, snapshot: &ProfileSnapshot) -> MergeOutcome {
        let outcome = self
            .state
            .merge(snapshot, self.config.merge_policy, Utc::now());
        let id = snapshot.id.clone();

        match outcome {
            MergeOutcome::Added => {
                info!(friend = %id, name = %snapshot.name, rounds = snapshot.rounds.len(), "friend added");
                self.reindex();
                self.persist();
                emit_event(
                    &self.events,
                    NodeEvent::FriendAdded {
                        id,
                        name: snapshot.name.clone(),
                    },
                );
            }
            MergeOutcome::Updated { new_rounds } => {
                info!(friend = %id, new_rounds, "friend updated");
                self.persist();
                emit_event(&self.events, NodeEvent::FriendUpdated { id, new_rounds });
            }
            MergeOutcome::Unchanged => {
                debug!(friend = %id, "snapshot brought nothing new");
            }
        }
        outcome
    }

    fn mark_connected(&mut self, id: GolferId, peer_id: PeerId) {
        if !self.state.roster().contains(&id) {
            // Not a friend (yet); keep it as an anonymous connection
            self.table.on_open(peer_id);
            return;
        }

        let was_connected = self.table.status(&id) == Connectivity::Connected;
        if let Some(superseded) = self.table.identify(id.clone(), peer_id, Instant::now()) {
            debug!(friend = %id, peer = %superseded, "closing superseded connection");
            self.send_swarm(SwarmCommand::Disconnect(superseded));
        }
        if !was_connected {
            info!(friend = %id, peer = %peer_id, "friend online");
            emit_event(&self.events, NodeEvent::PeerOnline { id });
        }
    }

    fn sync_now(&mut self, id: &GolferId) -> Result<()> {
        if !self.state.roster().contains(id) {
            return Err(ClientError::UnknownFriend(id.clone()));
        }
        match self.table.peer_of(id) {
            Some(peer) => self.push_snapshot(peer),
            None if self.swarm_tx.is_none() => debug!(friend = %id, "offline, sync deferred"),
            None => {
                if self.table.force_attempt(id, Instant::now()) {
                    self.dial(id);
                }
            }
        }
        Ok(())
    }

    fn connect(&mut self, id: &GolferId) {
        // offline: the sweep on attach reaches the friend
        if self.swarm_tx.is_none() {
            return;
        }
        if self.table.begin_attempt(id, Instant::now()) {
            self.dial(id);
        }
    }

    fn retry_sweep(&mut self) {
        let due = sweep(&mut self.table, self.state.roster().ids(), Instant::now());
        if !due.is_empty() {
            debug!(count = due.len(), "reconnect sweep");
        }
        for id in &due {
            self.dial(id);
        }
    }

    fn dial(&self, id: &GolferId) {
        match peer_id_for(id) {
            Some(peer) => {
                debug!(friend = %id, peer = %peer, "dialing friend");
                self.send_swarm(SwarmCommand::Dial(peer));
            }
            None => warn!(friend = %id, "cannot derive peer id"),
        }
    }

    fn push_snapshot(&self, peer_id: PeerId) {
        let snapshot = self.state.snapshot(self.config.snapshot_rounds);
        let rounds = snapshot.rounds.len();
        match WireMessage::SyncProfile(snapshot).to_value() {
            Ok(payload) => {
                debug!(peer = %peer_id, rounds, "pushing snapshot");
                self.send_swarm(SwarmCommand::Send { peer_id, payload });
            }
            Err(e) => warn!(error = %e, "failed to encode snapshot"),
        }
    }

    fn broadcast_snapshot(&self) {
        for peer in self.table.open_peers() {
            self.push_snapshot(peer);
        }
    }

    fn send_swarm(&self, cmd: SwarmCommand) {
        let Some(ref swarm_tx) = self.swarm_tx else {
            debug!(command = ?cmd, "no network endpoint, dropping command");
            return;
        };
        match swarm_tx.try_send(cmd) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                warn!(command = ?cmd, "network command queue full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("network endpoint gone");
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = self.db.save_state(&self.state.to_stored()) {
            warn!(error = %e, "failed to persist state, keeping it in memory");
        }
    }

    fn reindex(&mut self) {
        self.friend_peers = self
            .state
            .roster()
            .ids()
            .filter_map(|id| peer_id_for(id).map(|peer| (peer, id.clone())))
            .collect();
    }
}

fn open_database(config: &NodeConfig) -> Result<Database> {
    let opened = match config.data_dir {
        Some(ref dir) => Database::open_in(dir),
        None => Database::new(),
    };
    match opened {
        Ok(db) => Ok(db),
        Err(e) => {
            warn!(error = %e, "could not open database, falling back to memory");
            Ok(Database::open_in_memory()?)
        }
    }
}
