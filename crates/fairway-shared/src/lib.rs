//! Domain types and pure logic shared by every Fairway crate: identifiers,
//! rounds, profile snapshots, the share-code codec, the sync wire protocol
//! and the roster merge engine. Nothing in here performs I/O.

pub mod codec;
pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod roster;
pub mod types;

pub use codec::{decode_share_code, encode_share_code, share_link, strip_code_param};
pub use error::{ProfileError, ProtocolError, ShareCodeError};
pub use protocol::WireMessage;
pub use roster::{MergeOutcome, MergePolicy, Roster};
pub use types::{Friend, GolferId, HoleResult, ProfileSnapshot, Round, Shot};
