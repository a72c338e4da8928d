//! Presentation-facing callbacks.

use std::sync::RwLock;

use journal::{Direction, LogEntry, MessageLog};
use protocol::ToolDescriptor;
use serde_json::Value;

/// Receiver of everything the relay wants a user to see.
///
/// Rendering is left to the implementor; the relay only pushes data.
pub trait Panel: Send + Sync {
    /// Replace the displayed tool list.
    fn set_tools(&self, tools: &[ToolDescriptor]);

    /// Record one message or local outcome.
    fn add_message(&self, direction: Direction, kind: &str, data: Value);
}

/// Headless panel: keeps the latest catalog and a bounded message log.
#[derive(Debug, Default)]
pub struct PanelState {
    tools: RwLock<Vec<ToolDescriptor>>,
    log: MessageLog,
}

impl PanelState {
    pub fn new(log: MessageLog) -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
            log,
        }
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }
}

impl Panel for PanelState {
    fn set_tools(&self, tools: &[ToolDescriptor]) {
        *self.tools.write().unwrap_or_else(|e| e.into_inner()) = tools.to_vec();
    }

    fn add_message(&self, direction: Direction, kind: &str, data: Value) {
        self.log.append(LogEntry::new(direction, kind, data));
    }
}
