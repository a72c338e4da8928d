//! In-memory command registry for tests.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Notify;

use crate::registry::{CommandRegistry, RegistryError};
use crate::value::HostValue;

enum Outcome {
    Value(HostValue),
    Fail(String),
    Panic,
    // Returns null once the gate is notified.
    Gated(Arc<Notify>),
}

pub(crate) struct FakeCommand {
    id: String,
    label: Option<String>,
    enabled: bool,
    broken: bool,
    outcome: Outcome,
}

impl FakeCommand {
    pub(crate) fn returning(id: &str, value: impl Into<Value>) -> Self {
        Self::returning_value(id, HostValue::from(value.into()))
    }

    pub(crate) fn returning_value(id: &str, value: HostValue) -> Self {
        Self {
            id: id.to_string(),
            label: None,
            enabled: true,
            broken: false,
            outcome: Outcome::Value(value),
        }
    }

    pub(crate) fn failing(id: &str, message: &str) -> Self {
        Self {
            outcome: Outcome::Fail(message.to_string()),
            ..Self::returning(id, Value::Null)
        }
    }

    pub(crate) fn panicking(id: &str) -> Self {
        Self {
            outcome: Outcome::Panic,
            ..Self::returning(id, Value::Null)
        }
    }

    pub(crate) fn gated(id: &str, gate: Arc<Notify>) -> Self {
        Self {
            outcome: Outcome::Gated(gate),
            ..Self::returning(id, Value::Null)
        }
    }

    pub(crate) fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub(crate) fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn with_broken_metadata(mut self) -> Self {
        self.broken = true;
        self
    }
}

pub(crate) struct FakeRegistry {
    commands: Vec<FakeCommand>,
}

impl FakeRegistry {
    pub(crate) fn new(commands: impl IntoIterator<Item = FakeCommand>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
        }
    }

    fn find(&self, id: &str) -> Result<&FakeCommand, RegistryError> {
        self.commands
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn metadata(&self, id: &str) -> Result<&FakeCommand, RegistryError> {
        let command = self.find(id)?;
        if command.broken {
            return Err(RegistryError::Query {
                command: id.to_string(),
                reason: "widget disposed".to_string(),
            });
        }
        Ok(command)
    }
}

impl CommandRegistry for FakeRegistry {
    fn list_commands(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.id.clone()).collect()
    }

    fn has_command(&self, id: &str) -> bool {
        self.find(id).is_ok()
    }

    fn is_enabled(&self, id: &str) -> Result<bool, RegistryError> {
        Ok(self.metadata(id)?.enabled)
    }

    fn label(&self, id: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.metadata(id)?.label.clone())
    }

    fn caption(&self, id: &str) -> Result<Option<String>, RegistryError> {
        self.metadata(id).map(|_| None)
    }

    fn usage(&self, id: &str) -> Result<Option<String>, RegistryError> {
        self.metadata(id).map(|_| None)
    }

    async fn execute(&self, id: &str, _args: Value) -> Result<HostValue, RegistryError> {
        match &self.find(id)?.outcome {
            Outcome::Value(value) => Ok(value.clone()),
            Outcome::Fail(message) => Err(RegistryError::Execution(message.clone())),
            Outcome::Panic => panic!("command {id} blew up"),
            Outcome::Gated(gate) => {
                gate.notified().await;
                Ok(HostValue::Null)
            }
        }
    }
}
