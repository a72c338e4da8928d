//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid or could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `--params` was not valid JSON.
    #[error("invalid --params: {0}")]
    InvalidParams(serde_json::Error),

    /// Automatic reconnects are exhausted.
    ///
    /// The relay stays offline until it is started again.
    #[error("could not reach {url}, giving up")]
    RetriesExhausted { url: String },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
