//! Chat completions wire format
//!
//! Conversion between domain [`Message`]s / [`FunctionSpec`]s and the JSON
//! bodies the service accepts and returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolchat_domain::{FunctionSpec, Message, Role, ToolCallRequest};

/// Request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl<'a> ChatCompletionRequest<'a> {
    /// Build a request from the conversation. The system prompt, if any, is
    /// sent first and is not part of the stored history.
    pub fn new(
        system_prompt: Option<&str>,
        history: &[Message],
        functions: &'a [FunctionSpec],
        temperature: Option<f32>,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt {
            messages.push(WireMessage::system(prompt));
        }
        messages.extend(history.iter().map(WireMessage::from));

        Self {
            messages,
            tools: functions.iter().map(WireTool::from).collect(),
            tool_choice: (!functions.is_empty()).then_some("auto"),
            temperature,
        }
    }
}

/// One message in the request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    /// `null` for assistant messages that only carry tool calls.
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let content = if message.role == Role::Assistant
            && message.has_tool_calls()
            && message.content.is_empty()
        {
            None
        } else {
            Some(message.content.clone())
        };

        Self {
            role: message.role.as_str(),
            content,
            tool_calls: message.tool_calls.iter().map(WireToolCall::from).collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

/// Tool call as it appears in assistant messages (both directions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// JSON-encoded arguments, passed through untouched
    #[serde(default)]
    pub arguments: String,
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.call_id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.tool_name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<WireToolCall> for ToolCallRequest {
    fn from(call: WireToolCall) -> Self {
        ToolCallRequest::new(call.id, call.function.name, call.function.arguments)
    }
}

/// Function declaration offered to the model
#[derive(Debug, Clone, Serialize)]
pub struct WireTool<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireFunction<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub parameters: &'a Value,
}

impl<'a> From<&'a FunctionSpec> for WireTool<'a> {
    fn from(spec: &'a FunctionSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.parameters,
            },
        }
    }
}

/// Response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(default)]
    pub refusal: Option<String>,
}

impl From<ResponseMessage> for Message {
    fn from(message: ResponseMessage) -> Self {
        let content = message
            .content
            .or(message.refusal)
            .unwrap_or_default();
        let calls: Vec<ToolCallRequest> =
            message.tool_calls.into_iter().map(ToolCallRequest::from).collect();
        Message::assistant_with_tool_calls(content, calls)
    }
}
