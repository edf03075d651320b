use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

/// `<relay_addr>/p2p/<relay_peer_id>/p2p-circuit/p2p/<target_peer_id>`
pub fn build_relayed_addr(
    relay_addr: &Multiaddr,
    relay_peer_id: &PeerId,
    target_peer_id: &PeerId,
) -> Multiaddr {
    build_circuit_addr(relay_addr, relay_peer_id).with(Protocol::P2p(*target_peer_id))
}

/// `<relay_addr>/p2p/<relay_peer_id>/p2p-circuit`, the address we listen
/// on to hold a reservation at the relay.
pub fn build_circuit_addr(relay_addr: &Multiaddr, relay_peer_id: &PeerId) -> Multiaddr {
    relay_addr
        .clone()
        .with(Protocol::P2p(*relay_peer_id))
        .with(Protocol::P2pCircuit)
}

/// Split a configured relay multiaddr into its transport part and the
/// relay's peer id. `None` if the address carries no `/p2p/` component.
pub fn split_relay_addr(addr: &Multiaddr) -> Option<(Multiaddr, PeerId)> {
    let peer_id = extract_peer_id(addr)?;
    let base = addr
        .iter()
        .filter(|p| !matches!(p, Protocol::P2p(_)))
        .collect();
    Some((base, peer_id))
}

/// Extract a `PeerId` from a multiaddr, if one is present.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| {
        if let Protocol::P2p(peer_id) = p {
            Some(peer_id)
        } else {
            None
        }
    })
}
