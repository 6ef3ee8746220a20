//! Tool domain entities

use crate::core::error::ArgumentParseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool as published by the backend catalog.
///
/// Fields the backend may omit are optional here so that the schema adapter
/// can report them instead of the decoder silently inventing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name of the tool within the session (e.g., "echo")
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the tool's arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameter_schema: Some(schema),
        }
    }
}

/// A tool in the completion service's function-calling form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A request from the model to invoke a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id assigned by the model, unique within one assistant turn
    pub call_id: String,
    /// Name of the tool to call
    pub tool_name: String,
    /// Arguments exactly as serialized by the model
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the serialized arguments into a key-value mapping.
    ///
    /// An empty string is read as "no arguments", which models emit for
    /// parameterless tools.
    pub fn parse_arguments(&self) -> Result<Map<String, Value>, ArgumentParseError> {
        if self.arguments.trim().is_empty() {
            return Ok(Map::new());
        }

        let value: Value = serde_json::from_str(&self.arguments).map_err(|e| {
            ArgumentParseError::InvalidJson {
                tool_name: self.tool_name.clone(),
                reason: e.to_string(),
            }
        })?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(ArgumentParseError::NotAnObject {
                tool_name: self.tool_name.clone(),
                found: json_kind(&other),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
