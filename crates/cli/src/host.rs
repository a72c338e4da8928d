//! Command registry backed by external programs.

use std::process::Stdio;

use runtime::{CommandRegistry, HostValue, RegistryError};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::CommandConfig;

/// Runs each configured command as a child process.
///
/// The tool parameters are written to the program's stdin as JSON. Its
/// stdout becomes the result: parsed as JSON when possible, otherwise kept
/// as a string. A non-zero exit status is an execution failure.
pub struct ProcessRegistry {
    commands: Vec<CommandConfig>,
}

impl ProcessRegistry {
    pub fn new(commands: Vec<CommandConfig>) -> Self {
        Self { commands }
    }

    fn find(&self, id: &str) -> Result<&CommandConfig, RegistryError> {
        self.commands
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }
}

impl CommandRegistry for ProcessRegistry {
    fn list_commands(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.id.clone()).collect()
    }

    fn has_command(&self, id: &str) -> bool {
        self.find(id).is_ok()
    }

    fn is_enabled(&self, id: &str) -> Result<bool, RegistryError> {
        Ok(self.find(id)?.enabled)
    }

    fn label(&self, id: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.find(id)?.label.clone())
    }

    fn caption(&self, id: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.find(id)?.caption.clone())
    }

    fn usage(&self, id: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.find(id)?.usage.clone())
    }

    async fn execute(&self, id: &str, args: Value) -> Result<HostValue, RegistryError> {
        let command = self.find(id)?;
        let program = &command.program;

        let mut child = Command::new(program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RegistryError::Execution(format!("failed to spawn {program}: {e}")))?;

        let input = serde_json::to_vec(&args)
            .map_err(|e| RegistryError::Execution(format!("failed to encode parameters: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            // Programs are free to ignore their input and exit early.
            if let Err(e) = stdin.write_all(&input).await {
                debug!(command = %id, error = %e, "program did not read its parameters");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RegistryError::Execution(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RegistryError::Execution(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_output(&output.stdout))
    }
}

fn parse_output(stdout: &[u8]) -> HostValue {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return HostValue::Undefined;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => HostValue::from(value),
        Err(_) => HostValue::String(text.to_string()),
    }
}
