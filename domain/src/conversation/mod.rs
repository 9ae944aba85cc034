//! Conversation messages and completion results
//!
//! A [`ConversationContext`] is the ordered message list handed to the
//! completion capability. The reasoning loop appends to a private copy of it
//! as tool results come back; the caller's context is never mutated.
//!
//! ```text
//! ConversationContext ──complete()──▶ Completion::Final(text)
//!                                  └─▶ Completion::ToolCalls { intents }
//!                                          │ each intent executed in order
//!                                          ▼
//!                          Message::tool_result(...) appended, loop again
//! ```

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a tool call, correlated by `tool_call_id`.
    Tool,
}

/// The model's request to call one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallIntent {
    /// Id assigned by the completion service, echoed back with the result.
    pub id: String,
    /// Qualified capability name (`server.tool`).
    pub capability: String,
    pub arguments: serde_json::Value,
    /// Why the arguments text could not be parsed. When set, `arguments`
    /// holds the raw text as a JSON string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_error: Option<String>,
}

impl ToolCallIntent {
    pub fn new(
        id: impl Into<String>,
        capability: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            arguments,
            arguments_error: None,
        }
    }

    /// An intent whose arguments text is not JSON. It is kept so the
    /// dispatcher can answer it with a validation error.
    pub fn unparseable(
        id: impl Into<String>,
        capability: impl Into<String>,
        raw_arguments: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            arguments_error: Some(error.into()),
            ..Self::new(
                id,
                capability,
                serde_json::Value::String(raw_arguments.into()),
            )
        }
    }

    /// Arguments as the model sent them.
    pub fn arguments_text(&self) -> String {
        match (&self.arguments_error, &self.arguments) {
            (Some(_), serde_json::Value::String(raw)) => raw.clone(),
            (_, value) => value.to_string(),
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallIntent>,
    /// Set on `Role::Tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, intents: Vec<ToolCallIntent>) -> Self {
        Self {
            tool_calls: intents,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Ordered message history for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    messages: Vec<Message>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Context for one request: system prompt first (unless the history
    /// already carries one), then the history, then the new user text.
    pub fn for_request(system_prompt: &str, history: &ConversationContext, text: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        let has_system = history
            .messages
            .first()
            .is_some_and(|m| m.role == Role::System);
        if !has_system && !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.extend(history.messages.iter().cloned());
        messages.push(Message::user(text));
        Self { messages }
    }
}

/// What the completion capability decided to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Completion {
    /// A final textual answer; ends the turn.
    Final(String),
    /// One or more capabilities to call, in order. `text` is any
    /// accompanying commentary from the model.
    ToolCalls {
        text: String,
        intents: Vec<ToolCallIntent>,
    },
}

impl Completion {
    pub fn final_text(text: impl Into<String>) -> Self {
        Completion::Final(text.into())
    }

    pub fn tool_calls(intents: Vec<ToolCallIntent>) -> Self {
        Completion::ToolCalls {
            text: String::new(),
            intents,
        }
    }

    /// Intents requested by this completion. Empty for a final answer.
    pub fn intents(&self) -> &[ToolCallIntent] {
        match self {
            Completion::Final(_) => &[],
            Completion::ToolCalls { intents, .. } => intents,
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.intents().is_empty()
    }

    pub fn text(&self) -> &str {
        match self {
            Completion::Final(text) => text,
            Completion::ToolCalls { text, .. } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_for_request_prepends_system_prompt() {
        let history = ConversationContext::from_messages(vec![
            Message::user("hi"),
            Message::assistant("hello"),
        ]);
        let ctx = ConversationContext::for_request("be kind", &history, "what's up?");
        let roles: Vec<Role> = ctx.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(ctx.messages()[3].content, "what's up?");
    }

    #[test]
    fn test_for_request_keeps_existing_system_prompt() {
        let history = ConversationContext::with_system_prompt("original");
        let ctx = ConversationContext::for_request("replacement", &history, "q");
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.messages()[0].content, "original");
    }

    #[test]
    fn test_completion_intents() {
        let final_answer = Completion::final_text("done");
        assert!(!final_answer.requests_tools());
        assert_eq!(final_answer.text(), "done");

        let calls = Completion::tool_calls(vec![ToolCallIntent::new(
            "call_1",
            "search.web",
            json!({ "q": "rust" }),
        )]);
        assert!(calls.requests_tools());
        assert_eq!(calls.intents()[0].capability, "search.web");
    }

    #[test]
    fn test_tool_result_message() {
        let msg = Message::tool_result("call_1", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }
}
