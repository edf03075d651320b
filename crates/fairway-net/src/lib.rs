// P2P networking layer built on libp2p with QUIC transport.

pub mod behaviour;
pub mod discovery;
pub mod keys;
pub mod memory;
pub mod peers;
pub mod relay;
pub mod swarm;
pub mod transport;

pub use behaviour::{FairwayBehaviour, FairwayEvent};
pub use discovery::load_bootstrap_peers;
pub use keys::{keypair_for, peer_id_for};
pub use memory::MemoryNetwork;
pub use peers::{ConnectionInfo, ConnectionMode, PeerTracker};
pub use relay::{build_circuit_addr, build_relayed_addr, split_relay_addr};
pub use swarm::{spawn_swarm, SwarmCommand, SwarmConfig, SwarmHandle, SwarmNotification};
pub use transport::build_swarm;

pub use libp2p::{Multiaddr, PeerId};
