//! Bootstrap peer loading.
//!
//! Reads a configuration file containing multiaddrs (one per line) for the
//! swarm to dial and seed Kademlia with on startup.

use std::fs;
use std::path::Path;

use libp2p::Multiaddr;
use tracing::{debug, info, warn};

/// Load bootstrap peer multiaddrs from a configuration file.
///
/// The file format is one multiaddr per line. Empty lines and lines starting
/// with `#` are ignored. Malformed lines are logged and skipped; an
/// unreadable file yields no peers.
///
/// # Example file
///
/// ```text
/// # Fairway bootstrap nodes
/// /ip4/51.158.191.43/udp/4001/quic-v1/p2p/12D3KooW...
/// /ip4/198.51.100.10/udp/4001/quic-v1/p2p/12D3KooW...
/// ```
pub fn load_bootstrap_peers(path: &Path) -> Vec<Multiaddr> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read bootstrap peers file"
            );
            return Vec::new();
        }
    };

    let addrs: Vec<Multiaddr> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<Multiaddr>() {
            Ok(addr) => {
                debug!(addr = %addr, "Loaded bootstrap peer");
                Some(addr)
            }
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping invalid multiaddr");
                None
            }
        })
        .collect();

    info!(
        count = addrs.len(),
        path = %path.display(),
        "Loaded bootstrap peers"
    );

    addrs
}
