//! Wire messages exchanged with the peer.
//!
//! Every frame is a JSON object discriminated by its `type` field. The three
//! types the relay understands are decoded into typed payloads; anything
//! else is carried through untouched as [`Message::Other`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const REGISTER_TOOLS: &str = "register_tools";
pub const APPLY_TOOL: &str = "apply_tool";
pub const TOOL_RESULT: &str = "tool_result";

/// Wire-level projection of one host command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub usage: String,
    pub is_enabled: bool,
    #[serde(default = "ToolDescriptor::placeholder_parameters")]
    pub parameters: Value,
}

impl ToolDescriptor {
    /// Schema used for commands that publish no argument schema: any object.
    pub fn placeholder_parameters() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": true
        })
    }
}

/// Full tool list announced after every successful connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterTools {
    pub tools: Vec<ToolDescriptor>,
}

/// Request to execute a tool.
///
/// Outbound requests carry no `execution_id`; inbound ones carry whatever
/// token the peer chose, which is echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyTool {
    pub tool_id: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Value>,
}

/// Outcome of a peer-initiated execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(
        tool_id: impl Into<String>,
        execution_id: Option<Value>,
        result: Option<Value>,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            execution_id,
            success: true,
            result,
            error: None,
        }
    }

    pub fn failure(
        tool_id: impl Into<String>,
        execution_id: Option<Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            execution_id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// A single frame on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    RegisterTools(RegisterTools),
    ApplyTool(ApplyTool),
    ToolResult(ToolResult),
    /// A peer-defined type; `payload` is the complete object, `type` included.
    Other { kind: String, payload: Value },
}

impl Message {
    pub fn register_tools(tools: Vec<ToolDescriptor>) -> Self {
        Self::RegisterTools(RegisterTools { tools })
    }

    pub fn apply_tool(tool_id: impl Into<String>, parameters: Value) -> Self {
        Self::ApplyTool(ApplyTool {
            tool_id: tool_id.into(),
            parameters,
            execution_id: None,
        })
    }

    /// The `type` discriminator of this message.
    pub fn kind(&self) -> &str {
        match self {
            Self::RegisterTools(_) => REGISTER_TOOLS,
            Self::ApplyTool(_) => APPLY_TOOL,
            Self::ToolResult(_) => TOOL_RESULT,
            Self::Other { kind, .. } => kind,
        }
    }

    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let kind = match &value {
            Value::Object(map) => map
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or(Error::MissingType)?,
            _ => return Err(Error::NotAnObject),
        };

        let parsed = match kind.as_str() {
            REGISTER_TOOLS => serde_json::from_value(value).map(Self::RegisterTools),
            APPLY_TOOL => serde_json::from_value(value).map(Self::ApplyTool),
            TOOL_RESULT => serde_json::from_value(value).map(Self::ToolResult),
            _ => {
                return Ok(Self::Other {
                    kind: kind.clone(),
                    payload: value,
                });
            }
        };

        parsed.map_err(|e| Error::InvalidPayload {
            kind,
            reason: e.to_string(),
        })
    }

    /// Encode as a text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tagged<'a> {
    RegisterTools(&'a RegisterTools),
    ApplyTool(&'a ApplyTool),
    ToolResult(&'a ToolResult),
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::RegisterTools(m) => Tagged::RegisterTools(m).serialize(serializer),
            Self::ApplyTool(m) => Tagged::ApplyTool(m).serialize(serializer),
            Self::ToolResult(m) => Tagged::ToolResult(m).serialize(serializer),
            Self::Other { payload, .. } => payload.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
