//! Relay runtime: exposes host commands as tools to a remote peer.
//!
//! This crate holds the moving parts of the relay: building the tool
//! catalog from the host's command registry, keeping a reconnecting
//! WebSocket connection to the peer, and dispatching tool executions in
//! both directions.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **CommandRegistry**: A trait abstracting the host application's
//!   commands. The relay never looks the registry up globally; it is
//!   injected.
//! - **ConnectionManager**: Owns the socket and its state machine, with a
//!   bounded number of automatic reconnects.
//! - **Dispatcher**: Registers the catalog on every connect, answers peer
//!   `apply_tool` requests, and runs local or remote executions for the
//!   panel.
//! - **Panel**: Receives the tool list and message log for display.
//!
//! Results travel through [`serialize`], which bounds size and depth and
//! survives cyclic values.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use runtime::{ConnectionConfig, ConnectionManager, Dispatcher, PanelState};
//!
//! # async fn example(registry: Arc<impl runtime::CommandRegistry + 'static>) -> runtime::Result<()> {
//! let config = ConnectionConfig::for_base_url("ws://localhost:8888/")?;
//! let (connection, events) = ConnectionManager::new(config);
//! let panel = Arc::new(PanelState::default());
//!
//! let dispatcher = Dispatcher::new(registry, connection.clone(), panel.clone());
//! connection.connect();
//! dispatcher.run(events).await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
mod connection;
mod dispatcher;
mod error;
mod panel;
mod registry;
mod serialize;
mod value;

#[cfg(test)]
mod testing;

// Connection management
pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY, endpoint_url,
};

// Execution routing
pub use dispatcher::{APPLY_TOOL_ERROR, Dispatcher, LOCAL_EXECUTE, LOCAL_MAX_DEPTH};

// Error types
pub use error::{Error, Result};

// Host boundary
pub use panel::{Panel, PanelState};
pub use registry::{CommandRegistry, RegistryError};

// Result serialization
pub use serialize::{
    CIRCULAR_REFERENCE, DEFAULT_MAX_DEPTH, MAX_DEPTH_REACHED, MAX_ITEMS, UNSERIALIZABLE, serialize,
};
pub use value::{HostValue, Shared};
