//! Golfer id to libp2p identity.
//!
//! A node's keypair is derived from its golfer id, so the peer id of any
//! friend can be computed from the id in their share code alone. The id is
//! an address here, not a secret.

use libp2p::identity::{DecodingError, Keypair};
use libp2p::PeerId;

use fairway_shared::identity::peer_key_seed;
use fairway_shared::GolferId;

pub fn keypair_for(id: &GolferId) -> Result<Keypair, DecodingError> {
    Keypair::ed25519_from_bytes(peer_key_seed(id))
}

/// The peer id a node running as `id` listens under.
pub fn peer_id_for(id: &GolferId) -> Option<PeerId> {
    keypair_for(id).ok().map(|k| k.public().to_peer_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_is_stable() {
        let id = GolferId::parse("GF-AB12CD34").unwrap();
        let a = peer_id_for(&id).unwrap();
        let b = peer_id_for(&id).unwrap();
        assert_eq!(a, b);
        assert_eq!(keypair_for(&id).unwrap().public().to_peer_id(), a);
    }

    #[test]
    fn test_distinct_ids_distinct_peers() {
        let a = peer_id_for(&GolferId::parse("GF-AAAAAAAA").unwrap()).unwrap();
        let b = peer_id_for(&GolferId::parse("GF-BBBBBBBB").unwrap()).unwrap();
        assert_ne!(a, b);
    }
}
