//! Node configuration loaded from environment variables.
//!
//! All settings have defaults so a node starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use libp2p::Multiaddr;
use url::Url;

use fairway_net::SwarmConfig;
use fairway_shared::constants::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_QUIC_PORT, DEFAULT_RETRY_INTERVAL_SECS,
    DEFAULT_SNAPSHOT_ROUNDS, MAX_SNAPSHOT_ROUNDS,
};
use fairway_shared::MergePolicy;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Directory holding `fairway.db`.
    /// Env: `FAIRWAY_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// QUIC port to listen on, 0 for an ephemeral port.
    /// Env: `FAIRWAY_LISTEN_PORT`
    /// Default: `4001`
    pub listen_port: u16,

    /// File with bootstrap multiaddrs, one per line.
    /// Env: `FAIRWAY_BOOTSTRAP_PEERS`
    pub bootstrap_peers_path: Option<PathBuf>,

    /// Relay used as rendezvous point, ending in `/p2p/<relay peer id>`.
    /// Env: `FAIRWAY_RELAY_ADDR`
    pub relay_addr: Option<Multiaddr>,

    /// Period of the reconnect sweep. Also how long a connection attempt
    /// counts as in flight.
    /// Env: `FAIRWAY_RETRY_INTERVAL_SECS`
    /// Default: `60`
    pub retry_interval: Duration,

    /// Rounds included in each outgoing snapshot, clamped to `1..=50`.
    /// Env: `FAIRWAY_SNAPSHOT_ROUNDS`
    /// Default: `20`
    pub snapshot_rounds: usize,

    /// Env: `FAIRWAY_MERGE_POLICY` (`union` or `replace`)
    /// Default: `union`
    pub merge_policy: MergePolicy,

    /// Base of generated share links, e.g. `https://golf.example.com/`.
    /// Env: `FAIRWAY_SHARE_BASE_URL`
    pub share_base_url: Option<Url>,

    /// How long an unused connection stays open.
    /// Env: `FAIRWAY_IDLE_TIMEOUT_SECS`
    /// Default: `300`
    pub idle_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            listen_port: DEFAULT_QUIC_PORT,
            bootstrap_peers_path: None,
            relay_addr: None,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            snapshot_rounds: DEFAULT_SNAPSHOT_ROUNDS,
            merge_policy: MergePolicy::default(),
            share_base_url: None,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("FAIRWAY_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(port) = lookup("FAIRWAY_LISTEN_PORT") {
            match port.parse() {
                Ok(port) => config.listen_port = port,
                Err(_) => tracing::warn!(value = %port, "Invalid FAIRWAY_LISTEN_PORT, using default"),
            }
        }

        if let Some(path) = lookup("FAIRWAY_BOOTSTRAP_PEERS") {
            config.bootstrap_peers_path = Some(PathBuf::from(path));
        }

        if let Some(addr) = lookup("FAIRWAY_RELAY_ADDR") {
            match addr.parse::<Multiaddr>() {
                Ok(parsed) => config.relay_addr = Some(parsed),
                Err(e) => tracing::warn!(value = %addr, error = %e, "Invalid FAIRWAY_RELAY_ADDR, ignoring"),
            }
        }

        if let Some(secs) = lookup("FAIRWAY_RETRY_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => config.retry_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %secs, "Invalid FAIRWAY_RETRY_INTERVAL_SECS, using default"),
            }
        }

        if let Some(count) = lookup("FAIRWAY_SNAPSHOT_ROUNDS") {
            match count.parse::<usize>() {
                Ok(count) => config.snapshot_rounds = count.clamp(1, MAX_SNAPSHOT_ROUNDS),
                Err(_) => tracing::warn!(value = %count, "Invalid FAIRWAY_SNAPSHOT_ROUNDS, using default"),
            }
        }

        if let Some(policy) = lookup("FAIRWAY_MERGE_POLICY") {
            match policy.parse() {
                Ok(policy) => config.merge_policy = policy,
                Err(e) => tracing::warn!(error = %e, "Invalid FAIRWAY_MERGE_POLICY, using default"),
            }
        }

        if let Some(base) = lookup("FAIRWAY_SHARE_BASE_URL") {
            match Url::parse(&base) {
                Ok(url) => config.share_base_url = Some(url),
                Err(e) => tracing::warn!(value = %base, error = %e, "Invalid FAIRWAY_SHARE_BASE_URL, ignoring"),
            }
        }

        if let Some(secs) = lookup("FAIRWAY_IDLE_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => config.idle_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %secs, "Invalid FAIRWAY_IDLE_TIMEOUT_SECS, using default"),
            }
        }

        config
    }

    pub fn swarm_config(&self) -> SwarmConfig {
        SwarmConfig {
            bootstrap_peers_path: self.bootstrap_peers_path.clone(),
            listen_port: self.listen_port,
            relay_addr: self.relay_addr.clone(),
            idle_timeout: self.idle_timeout,
        }
    }
}
