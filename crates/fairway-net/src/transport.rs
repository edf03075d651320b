use std::time::Duration;

use libp2p::identity::Keypair;
use tracing::info;

use crate::behaviour::FairwayBehaviour;

pub fn build_swarm(
    keypair: Keypair,
    idle_timeout: Duration,
) -> anyhow::Result<libp2p::Swarm<FairwayBehaviour>> {
    use libp2p::kad::{self, store::MemoryStore};
    use libp2p::request_response::{self, ProtocolSupport};
    use libp2p::{dcutr, identify, noise, StreamProtocol, SwarmBuilder};

    use fairway_shared::constants::{PROTOCOL_VERSION, SYNC_PROTOCOL};

    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_quic()
        .with_relay_client(noise::Config::new, libp2p::yamux::Config::default)?
        .with_behaviour(|key, relay_client| -> std::result::Result<FairwayBehaviour, Box<dyn std::error::Error + Send + Sync>> {
            let local_peer_id = key.public().to_peer_id();

            let sync = request_response::json::Behaviour::new(
                [(StreamProtocol::new(SYNC_PROTOCOL), ProtocolSupport::Full)],
                request_response::Config::default()
                    .with_request_timeout(Duration::from_secs(30)),
            );

            let store = MemoryStore::new(local_peer_id);
            let mut kademlia = kad::Behaviour::new(local_peer_id, store);
            kademlia.set_mode(Some(kad::Mode::Server));

            let identify_config =
                identify::Config::new(PROTOCOL_VERSION.to_string(), key.public())
                    .with_push_listen_addr_updates(true)
                    .with_interval(Duration::from_secs(60));
            let identify = identify::Behaviour::new(identify_config);

            let dcutr = dcutr::Behaviour::new(local_peer_id);

            Ok(FairwayBehaviour {
                sync,
                kademlia,
                identify,
                relay_client,
                dcutr,
            })
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
        .build();

    info!(
        peer_id = %swarm.local_peer_id(),
        "Built Fairway swarm with QUIC + Relay transport"
    );

    Ok(swarm)
}
