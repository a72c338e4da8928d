//! Projection of host commands into wire tool descriptors.

use protocol::{ToolDescriptor, round_trips, to_tool_id};
use tracing::{debug, warn};

use crate::registry::{CommandRegistry, RegistryError};

/// Snapshot every command the registry knows as a tool.
///
/// A command whose metadata cannot be read is logged and left out; the rest
/// of the catalog is still built.
pub fn build<R: CommandRegistry>(registry: &R) -> Vec<ToolDescriptor> {
    let commands = registry.list_commands();
    let mut tools = Vec::with_capacity(commands.len());

    for command in commands {
        match describe(registry, &command) {
            Ok(tool) => {
                if !round_trips(&command) {
                    warn!(command = %command, tool_id = %tool.id, "command id contains a space and will not map back to itself");
                }
                tools.push(tool);
            }
            Err(e) => warn!(command = %command, error = %e, "skipping command"),
        }
    }

    debug!(count = tools.len(), "built tool catalog");
    tools
}

/// Describe a single command.
pub fn describe<R: CommandRegistry>(
    registry: &R,
    command: &str,
) -> Result<ToolDescriptor, RegistryError> {
    let is_enabled = registry.is_enabled(command)?;
    let label = registry
        .label(command)?
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| command.to_string());
    let caption = registry.caption(command)?.unwrap_or_default();
    let usage = registry.usage(command)?.unwrap_or_default();

    Ok(ToolDescriptor {
        id: to_tool_id(command),
        label,
        caption,
        usage,
        is_enabled,
        // The host does not publish per-command argument schemas.
        parameters: ToolDescriptor::placeholder_parameters(),
    })
}
