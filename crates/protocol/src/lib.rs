//! Wire protocol for the notebook command relay.
//!
//! This crate defines the JSON messages exchanged with the peer over the
//! relay connection, and the mapping between host command ids and the tool
//! ids the peer sees.
//!
//! # Example
//!
//! ```
//! use protocol::{Message, to_command_id, to_tool_id};
//!
//! let text = r#"{"type":"apply_tool","tool_id":"notebook run","parameters":{},"execution_id":"e1"}"#;
//! let message = Message::parse(text)?;
//! assert_eq!(message.kind(), "apply_tool");
//!
//! assert_eq!(to_tool_id("notebook:run"), "notebook run");
//! assert_eq!(to_command_id("notebook run"), "notebook:run");
//! # Ok::<(), protocol::Error>(())
//! ```

mod error;
mod message;
mod tool_id;

pub use error::{Error, Result};
pub use message::{
    APPLY_TOOL, ApplyTool, Message, REGISTER_TOOLS, RegisterTools, TOOL_RESULT, ToolDescriptor,
    ToolResult,
};
pub use tool_id::{HOST_SEPARATOR, WIRE_SEPARATOR, round_trips, to_command_id, to_tool_id};

/// Path of the relay endpoint below the host's base WebSocket URL.
pub const ENDPOINT_PATH: &str = "jupyter-mcp-tools/echo";
