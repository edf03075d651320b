use serde::Serialize;
use tokio::sync::broadcast;

use fairway_shared::GolferId;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Changes observable by subscribers of a running node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum NodeEvent {
    FriendAdded { id: GolferId, name: String },
    FriendUpdated { id: GolferId, new_rounds: usize },
    FriendRemoved { id: GolferId },
    PeerOnline { id: GolferId },
    PeerOffline { id: GolferId },
    /// Local name or round history changed.
    ProfileChanged,
}

pub fn emit_event(tx: &broadcast::Sender<NodeEvent>, event: NodeEvent) {
    // No subscribers is fine
    if tx.send(event).is_err() {
        tracing::trace!("event dropped, no subscribers");
    }
}
