use thiserror::Error;

/// Everything that can go wrong turning user input into a profile.
/// All variants mean the same thing to a user: "invalid code".
#[derive(Error, Debug)]
pub enum ShareCodeError {
    #[error("Invalid code: input is empty")]
    Empty,

    #[error("Invalid code: base64 decode failed")]
    Base64,

    #[error("Invalid code: payload is not UTF-8")]
    Utf8,

    #[error("Invalid code: payload is not JSON ({0})")]
    Json(String),

    #[error("Invalid code: {0}")]
    Profile(#[from] ProfileError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("missing or empty id")]
    MissingId,

    #[error("missing or empty name")]
    MissingName,

    #[error("invalid golfer id: {0:?}")]
    InvalidId(String),

    #[error("round without id")]
    MissingRoundId,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed wire message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Wire message has no type tag")]
    MissingType,

    #[error("Snapshot for {0} was not sent by that golfer")]
    SenderMismatch(String),
}
