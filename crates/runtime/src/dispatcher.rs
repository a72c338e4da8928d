//! Routing of tool executions between the host and the peer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use journal::Direction;
use protocol::{ApplyTool, Message, ToolDescriptor, ToolResult, to_command_id};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Result;
use crate::catalog;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::panel::Panel;
use crate::registry::{CommandRegistry, RegistryError};
use crate::serialize::{DEFAULT_MAX_DEPTH, serialize};
use crate::value::HostValue;

/// Log kind for commands executed from the panel.
pub const LOCAL_EXECUTE: &str = "local_execute";

/// Log kind for remote execution requests that could not be sent.
pub const APPLY_TOOL_ERROR: &str = "apply_tool_error";

/// Depth kept for results shown in the panel.
pub const LOCAL_MAX_DEPTH: usize = 2;

/// Connects the host registry, the peer connection and the panel.
///
/// No method returns a host failure to its caller: every outcome ends up
/// in the panel log or in a `tool_result` sent to the peer.
pub struct Dispatcher<R> {
    registry: Arc<R>,
    connection: ConnectionManager,
    panel: Arc<dyn Panel>,
}

impl<R> Clone for Dispatcher<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            connection: self.connection.clone(),
            panel: self.panel.clone(),
        }
    }
}

impl<R: CommandRegistry + 'static> Dispatcher<R> {
    pub fn new(registry: Arc<R>, connection: ConnectionManager, panel: Arc<dyn Panel>) -> Self {
        Self {
            registry,
            connection,
            panel,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Consume connection events until the manager is dropped.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("connection event stream ended");
    }

    pub async fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened(generation) => {
                // Let command registrations queued on this tick land first.
                tokio::task::yield_now().await;
                if !self.connection.is_current(generation) {
                    debug!(generation, "connection superseded, skipping registration");
                    return;
                }
                self.register_tools();
            }
            ConnectionEvent::Message(message) => self.handle_message(message),
            ConnectionEvent::Closed => debug!("connection closed"),
            ConnectionEvent::RetriesExhausted => {
                warn!("relay offline until reconnected manually")
            }
        }
    }

    /// Announce the current catalog to the panel and the peer.
    pub fn register_tools(&self) -> Vec<ToolDescriptor> {
        let tools = catalog::build(self.registry.as_ref());
        self.panel.set_tools(&tools);

        let message = Message::register_tools(tools.clone());
        match self.send(&message) {
            Ok(()) => info!(count = tools.len(), "registered tools with peer"),
            Err(e) => warn!(error = %e, "failed to register tools"),
        }
        tools
    }

    /// Run a command on the host on behalf of the panel.
    pub async fn execute_local(&self, tool_id: &str, parameters: Value) {
        let command_id = to_command_id(tool_id);
        let data = match self.invoke(&command_id, parameters.clone()).await {
            Ok(value) => json!({
                "tool_id": tool_id,
                "parameters": parameters,
                "success": true,
                "result": serialize(&value, LOCAL_MAX_DEPTH),
            }),
            Err(e) => {
                warn!(command = %command_id, error = %e, "local execution failed");
                json!({
                    "tool_id": tool_id,
                    "parameters": parameters,
                    "success": false,
                    "error": e.to_string(),
                })
            }
        };
        self.panel.add_message(Direction::Sent, LOCAL_EXECUTE, data);
    }

    /// Run [`execute_local`](Self::execute_local) on its own task so peer
    /// requests keep being served while the command runs.
    pub fn spawn_local(&self, tool_id: &str, parameters: Value) -> JoinHandle<()> {
        let this = self.clone();
        let tool_id = tool_id.to_string();
        tokio::spawn(async move { this.execute_local(&tool_id, parameters).await })
    }

    /// Ask the peer to execute a tool. The reply, if any, arrives as a
    /// regular inbound message.
    pub fn execute_remote(&self, tool_id: &str, parameters: Value) {
        let message = Message::apply_tool(tool_id, parameters);
        if let Err(e) = self.send(&message) {
            self.panel.add_message(
                Direction::Sent,
                APPLY_TOOL_ERROR,
                json!({ "tool_id": tool_id, "error": e.to_string() }),
            );
        }
    }

    /// Execute a peer request and build the correlated result.
    pub async fn apply_tool(&self, request: ApplyTool) -> ToolResult {
        let ApplyTool {
            tool_id,
            parameters,
            execution_id,
        } = request;
        let command_id = to_command_id(&tool_id);

        match self.invoke(&command_id, parameters).await {
            Ok(value) => {
                let result = (!value.is_undefined()).then(|| serialize(&value, DEFAULT_MAX_DEPTH));
                ToolResult::success(tool_id, execution_id, result)
            }
            Err(e) => {
                warn!(command = %command_id, error = %e, "peer execution failed");
                ToolResult::failure(tool_id, execution_id, e.to_string())
            }
        }
    }

    fn handle_message(&self, message: Message) {
        self.panel
            .add_message(Direction::Received, message.kind(), message.to_value());

        if let Message::ApplyTool(request) = message {
            let this = self.clone();
            tokio::spawn(async move {
                let result = this.apply_tool(request).await;
                if let Err(e) = this.send(&Message::ToolResult(result)) {
                    warn!(error = %e, "failed to return tool result");
                }
            });
        }
    }

    async fn invoke(
        &self,
        command_id: &str,
        parameters: Value,
    ) -> std::result::Result<HostValue, RegistryError> {
        if !self.registry.has_command(command_id) {
            return Err(RegistryError::NotFound(command_id.to_string()));
        }
        debug!(command = %command_id, "executing command");

        AssertUnwindSafe(self.registry.execute(command_id, parameters))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(RegistryError::Panicked(command_id.to_string())))
    }

    fn send(&self, message: &Message) -> Result<()> {
        self.connection.send(message)?;
        self.panel
            .add_message(Direction::Sent, message.kind(), message.to_value());
        Ok(())
    }
}
