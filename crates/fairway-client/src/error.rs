use thiserror::Error;

use fairway_shared::{GolferId, ShareCodeError};
use fairway_store::StoreError;

/// Errors surfaced to the user-facing side of the node. Background sync
/// failures never end up here; they are logged and retried.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    InvalidCode(#[from] ShareCodeError),

    #[error("That code is your own")]
    OwnCode,

    #[error("Unknown friend: {0}")]
    UnknownFriend(GolferId),

    #[error("Invalid link: {0}")]
    InvalidLink(#[from] url::ParseError),

    #[error("No share base URL configured")]
    NoShareBaseUrl,

    #[error("Node is not running")]
    NodeStopped,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0:#}")]
    Network(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
