//! Configuration loading from cmdrelay.toml.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use runtime::{ConnectionConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, endpoint_url};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Peer connection settings.
    #[serde(default)]
    pub connection: ConnectionSection,

    /// Message log settings.
    #[serde(default)]
    pub log: LogSection,

    /// Commands exposed as tools.
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

/// Where and how to reach the peer.
#[derive(Debug, Deserialize)]
pub struct ConnectionSection {
    /// Base WebSocket URL of the notebook server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Relay endpoint below `base_url`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoint: default_endpoint(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogSection {
    /// Entries kept before the oldest are evicted.
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

/// One host command backed by an external program.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Host command id, e.g. `notebook:run-all`.
    pub id: String,
    pub label: Option<String>,
    pub caption: Option<String>,
    pub usage: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Program to run; receives the parameters as JSON on stdin.
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_base_url() -> String {
    "ws://localhost:8888/".to_string()
}

fn default_endpoint() -> String {
    protocol::ENDPOINT_PATH.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

fn default_log_capacity() -> usize {
    journal::DEFAULT_CAPACITY
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for command in &self.commands {
            if command.id.is_empty() {
                return Err(ConfigError::InvalidCommand {
                    id: command.id.clone(),
                    reason: "id is empty".to_string(),
                });
            }
            if command.program.is_empty() {
                return Err(ConfigError::InvalidCommand {
                    id: command.id.clone(),
                    reason: "program is empty".to_string(),
                });
            }
            if !seen.insert(command.id.as_str()) {
                return Err(ConfigError::DuplicateCommand(command.id.clone()));
            }
        }
        Ok(())
    }

    /// Build the connection settings for the relay endpoint.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let section = &self.connection;
        let url = endpoint_url(&section.base_url, &section.endpoint)?;
        Ok(ConnectionConfig::new(url)
            .with_max_retries(section.max_retries)
            .with_retry_delay(Duration::from_millis(section.retry_delay_ms)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] runtime::Error),

    #[error("command '{0}' is defined more than once")]
    DuplicateCommand(String),

    #[error("invalid command '{id}': {reason}")]
    InvalidCommand { id: String, reason: String },
}
