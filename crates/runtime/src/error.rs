use thiserror::Error;

use crate::connection::ConnectionState;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection is {0}, message not sent")]
    NotConnected(ConnectionState),

    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Protocol(#[from] protocol::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, Error>;
