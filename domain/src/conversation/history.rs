//! Conversation history
//!
//! [`Conversation`] is the ordered message log replayed to the model on
//! every completion request. It enforces the tool-result invariant: a tool
//! message may only answer a call that the immediately preceding assistant
//! message requested and that has not been answered yet.

use crate::conversation::message::{Message, Role};
use crate::core::error::DomainError;

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    /// Call ids of the last assistant message still waiting for a tool message.
    open_calls: Vec<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Call ids requested by the last assistant message that have no result yet.
    pub fn open_tool_calls(&self) -> &[String] {
        &self.open_calls
    }

    /// Append user input. Any unanswered calls of the previous assistant
    /// message can no longer be answered afterwards.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.open_calls.clear();
        self.messages.push(Message::user(content));
    }

    /// Append a model response, opening one slot per requested tool call.
    pub fn push_assistant(&mut self, message: Message) -> Result<(), DomainError> {
        if message.role != Role::Assistant {
            return Err(DomainError::UnexpectedRole(message.role));
        }
        self.open_calls = message
            .tool_calls
            .iter()
            .map(|call| call.call_id.clone())
            .collect();
        self.messages.push(message);
        Ok(())
    }

    /// Append the outcome of a tool call.
    pub fn push_tool_result(
        &mut self,
        call_id: &str,
        tool_name: &str,
        content: impl Into<String>,
    ) -> Result<(), DomainError> {
        let Some(position) = self.open_calls.iter().position(|id| id == call_id) else {
            return Err(DomainError::UnmatchedToolResult(call_id.to_string()));
        };
        self.open_calls.remove(position);
        self.messages
            .push(Message::tool_result(call_id, tool_name, content));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.open_calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::entities::ToolCallRequest;

    fn assistant_calling(ids: &[&str]) -> Message {
        Message::assistant_with_tool_calls(
            "",
            ids.iter()
                .map(|id| ToolCallRequest::new(*id, "echo", "{}"))
                .collect(),
        )
    }

    #[test]
    fn test_tool_result_answers_open_call() {
        let mut history = Conversation::new();
        history.push_user("list my tools");
        history.push_assistant(assistant_calling(&["c1"])).unwrap();
        history.push_tool_result("c1", "echo", "hi").unwrap();

        let last = history.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(last.content, "hi");
        assert!(history.open_tool_calls().is_empty());
    }

    #[test]
    fn test_tool_result_without_request_is_rejected() {
        let mut history = Conversation::new();
        history.push_user("hello");
        let err = history.push_tool_result("c1", "echo", "hi").unwrap_err();
        assert_eq!(err, DomainError::UnmatchedToolResult("c1".to_string()));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_duplicate_tool_result_is_rejected() {
        let mut history = Conversation::new();
        history.push_assistant(assistant_calling(&["c1", "c2"])).unwrap();
        history.push_tool_result("c1", "echo", "one").unwrap();
        assert!(history.push_tool_result("c1", "echo", "again").is_err());
        assert_eq!(history.open_tool_calls(), ["c2".to_string()]);
    }

    #[test]
    fn test_calls_of_older_assistant_message_cannot_be_answered() {
        let mut history = Conversation::new();
        history.push_assistant(assistant_calling(&["c1"])).unwrap();
        history.push_assistant(assistant_calling(&["c2"])).unwrap();
        assert!(history.push_tool_result("c1", "echo", "late").is_err());
        assert!(history.push_tool_result("c2", "echo", "ok").is_ok());
    }

    #[test]
    fn test_user_message_closes_open_calls() {
        let mut history = Conversation::new();
        history.push_assistant(assistant_calling(&["c1"])).unwrap();
        history.push_user("never mind");
        assert!(history.open_tool_calls().is_empty());
        assert!(history.push_tool_result("c1", "echo", "late").is_err());
    }

    #[test]
    fn test_push_assistant_rejects_other_roles() {
        let mut history = Conversation::new();
        let err = history.push_assistant(Message::user("hi")).unwrap_err();
        assert_eq!(err, DomainError::UnexpectedRole(Role::User));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut history = Conversation::new();
        history.push_user("a");
        history.push_assistant(assistant_calling(&["c1"])).unwrap();
        history.clear();
        assert!(history.is_empty());
        assert!(history.open_tool_calls().is_empty());
    }
}
