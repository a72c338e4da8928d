//! Message log for the notebook command relay.
//!
//! Every frame the relay sends or receives, and every locally executed
//! command, is recorded as a [`LogEntry`] so the side panel can render a
//! history of the session. The log lives in memory only and is bounded:
//! [`MessageLog`] evicts its oldest entries once it reaches capacity.
//!
//! # Example
//!
//! ```
//! use journal::{Direction, LogEntry, MessageLog};
//! use serde_json::json;
//!
//! let log = MessageLog::with_capacity(100);
//! log.append(LogEntry::sent("register_tools", json!({"tools": []})));
//! log.append(LogEntry::received("apply_tool", json!({"tool_id": "notebook run"})));
//!
//! for entry in log.entries() {
//!     println!("{} {} {}", entry.timestamp, entry.direction, entry.kind);
//! }
//! assert_eq!(log.entries()[1].direction, Direction::Received);
//! ```

mod entry;
mod log;

pub use entry::{Direction, EntryId, LogEntry};
pub use log::{DEFAULT_CAPACITY, MessageLog};
