//! Composed libp2p `NetworkBehaviour` for Fairway nodes.
//!
//! Combines request-response (profile sync), Kademlia (locating a friend's
//! peer id), Identify (protocol negotiation), Relay client (NAT traversal
//! and rendezvous via a relay), and DCUtR (direct connection upgrade
//! through relay).

use libp2p::{
    dcutr, identify,
    kad::{self, store::MemoryStore},
    relay, request_response,
    swarm::NetworkBehaviour,
};

/// Request-response behaviour carrying untrusted JSON sync payloads.
///
/// The response is an empty transport-level receipt, not an application
/// acknowledgement.
pub type SyncBehaviour = request_response::json::Behaviour<serde_json::Value, ()>;

/// Composed network behaviour for Fairway nodes.
///
/// All sub-behaviours are driven by the single swarm event loop.
/// Construction is handled by [`super::transport::build_swarm`] via
/// `SwarmBuilder`.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "FairwayEvent")]
pub struct FairwayBehaviour {
    /// Profile snapshot exchange
    pub sync: SyncBehaviour,
    /// Distributed hash table for peer discovery
    pub kademlia: kad::Behaviour<MemoryStore>,
    /// Protocol identification and capability advertisement
    pub identify: identify::Behaviour,
    /// Circuit relay v2 client for NAT traversal
    pub relay_client: relay::client::Behaviour,
    /// Direct Connection Upgrade through Relay
    pub dcutr: dcutr::Behaviour,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum FairwayEvent {
    Sync(request_response::Event<serde_json::Value, ()>),
    Kademlia(kad::Event),
    Identify(identify::Event),
    RelayClient(relay::client::Event),
    Dcutr(dcutr::Event),
}

impl From<request_response::Event<serde_json::Value, ()>> for FairwayEvent {
    fn from(event: request_response::Event<serde_json::Value, ()>) -> Self {
        FairwayEvent::Sync(event)
    }
}

impl From<kad::Event> for FairwayEvent {
    fn from(event: kad::Event) -> Self {
        FairwayEvent::Kademlia(event)
    }
}

impl From<identify::Event> for FairwayEvent {
    fn from(event: identify::Event) -> Self {
        FairwayEvent::Identify(event)
    }
}

impl From<relay::client::Event> for FairwayEvent {
    fn from(event: relay::client::Event) -> Self {
        FairwayEvent::RelayClient(event)
    }
}

impl From<dcutr::Event> for FairwayEvent {
    fn from(event: dcutr::Event) -> Self {
        FairwayEvent::Dcutr(event)
    }
}
