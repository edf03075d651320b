use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::ProfileSnapshot;

const SYNC_PROFILE_TAG: &str = "SYNC_PROFILE";

/// All wire protocol messages exchanged between peers.
///
/// Encoded as `{"type": "...", "payload": ...}`. A `type` this build does
/// not know decodes to [`WireMessage::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WireMessage {
    /// Full profile push, sent by both sides as soon as a connection opens
    /// and again whenever the local round history changes.
    #[serde(rename = "SYNC_PROFILE")]
    SyncProfile(ProfileSnapshot),

    /// A message kind from a newer peer; carries the tag for logging.
    #[serde(skip)]
    Unknown(String),
}

impl WireMessage {
    pub fn to_value(&self) -> Result<serde_json::Value, ProtocolError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Validate an untrusted payload received from a peer.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        match value.get("type").and_then(serde_json::Value::as_str) {
            Some(SYNC_PROFILE_TAG) => Ok(serde_json::from_value(value)?),
            Some(other) => Ok(WireMessage::Unknown(other.to_string())),
            None => Err(ProtocolError::MissingType),
        }
    }
}
