//! Mapping between host command ids and wire-level tool ids.
//!
//! The peer addresses tools by an id in which `:` is structurally
//! significant, so host ids travel with every `:` replaced by a space.
//! The mapping is lossy for host ids that already contain a space.

/// Separator used by host command ids.
pub const HOST_SEPARATOR: char = ':';

/// Replacement for [`HOST_SEPARATOR`] on the wire.
pub const WIRE_SEPARATOR: char = ' ';

/// Convert a host command id into a wire tool id.
pub fn to_tool_id(command_id: &str) -> String {
    command_id.replace(HOST_SEPARATOR, &WIRE_SEPARATOR.to_string())
}

/// Recover the host command id from a wire tool id.
pub fn to_command_id(tool_id: &str) -> String {
    tool_id.replace(WIRE_SEPARATOR, &HOST_SEPARATOR.to_string())
}

/// Whether a host id survives the round trip through [`to_tool_id`].
pub fn round_trips(command_id: &str) -> bool {
    !command_id.contains(WIRE_SEPARATOR)
}
