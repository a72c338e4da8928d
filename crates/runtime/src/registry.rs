//! Host command registry boundary.

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

use crate::value::HostValue;

/// Errors reported by a command registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Command not found: {0}")]
    NotFound(String),
    #[error("failed to query {command}: {reason}")]
    Query { command: String, reason: String },
    #[error("{0}")]
    Execution(String),
    #[error("command {0} panicked")]
    Panicked(String),
}

/// The host application's table of invocable commands.
///
/// This is the boundary between the relay and the notebook application.
/// Metadata queries may fail independently per command; `execute` may take
/// arbitrarily long and is never cancelled by the relay.
pub trait CommandRegistry: Send + Sync {
    /// Every command id currently known to the host.
    fn list_commands(&self) -> Vec<String>;

    fn has_command(&self, id: &str) -> bool;

    fn is_enabled(&self, id: &str) -> Result<bool, RegistryError>;

    fn label(&self, id: &str) -> Result<Option<String>, RegistryError>;

    fn caption(&self, id: &str) -> Result<Option<String>, RegistryError>;

    fn usage(&self, id: &str) -> Result<Option<String>, RegistryError>;

    /// Invoke a command with the arguments supplied by the caller.
    fn execute(
        &self,
        id: &str,
        args: Value,
    ) -> impl Future<Output = Result<HostValue, RegistryError>> + Send;
}
