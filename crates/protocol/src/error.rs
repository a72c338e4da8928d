//! Protocol error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no string \"type\" field")]
    MissingType,

    #[error("invalid {kind} message: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
