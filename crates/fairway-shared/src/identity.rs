use rand::Rng;

use crate::constants::{GOLFER_ID_PREFIX, GOLFER_ID_SUFFIX_LEN, KDF_CONTEXT_PEER_KEY};
use crate::types::GolferId;

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

impl GolferId {
    /// Generate a new random identifier, e.g. `GF-7K2Q9ZXA`.
    ///
    /// Only called once per installation; persistence lives in the store.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..GOLFER_ID_SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("{GOLFER_ID_PREFIX}{suffix}"))
    }
}

/// Derive the 32-byte Ed25519 secret that backs the peer-network address
/// of `id`.
///
/// Deterministic, so the address of any friend can be computed from the
/// identifier alone.
pub fn peer_key_seed(id: &GolferId) -> [u8; 32] {
    blake3::derive_key(KDF_CONTEXT_PEER_KEY, id.as_str().as_bytes())
}
