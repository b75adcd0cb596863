//! Session types: messages, roles, tool-call records, and session metadata.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call recorded inside an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool that was called
    pub name: String,
    /// Raw JSON argument string
    pub arguments: String,
}

impl ToolCallRecord {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// A single message in a session transcript.
///
/// Serialized one per line in the session JSONL file. Optional fields are
/// omitted from JSON when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
    /// ID of the tool call this message responds to (role = tool only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls made by the assistant, in provider order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    /// RFC-3339 timestamp, assigned on append when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: None,
            timestamp: None,
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: None,
            timestamp: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: None,
            timestamp: None,
        }
    }

    /// Create a tool result message, back-referencing the tool call id.
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: Role::Tool,
            content: content.to_string(),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
            timestamp: None,
        }
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: Some(tool_calls),
            timestamp: None,
        }
    }

    /// Check if this message carries tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}

/// Session metadata, stored as the first line of the JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// The session routing key (e.g. "telegram:chat123")
    pub key: String,
    /// RFC-3339 creation timestamp
    pub created_at: String,
    /// RFC-3339 last-update timestamp
    pub updated_at: String,
    /// Index below which messages are considered summarised.
    /// Invariant: `last_consolidated <= messages.len()`.
    #[serde(default)]
    pub last_consolidated: usize,
}

impl SessionMeta {
    /// New metadata with both timestamps set to now.
    pub fn new(key: &str) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            key: key.to_string(),
            created_at: now.clone(),
            updated_at: now,
            last_consolidated: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("Hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Hello");
        assert!(user.tool_calls.is_none());
        assert!(user.timestamp.is_none());

        let assistant = Message::assistant("Hi there");
        assert_eq!(assistant.role, Role::Assistant);

        let system = Message::system("You are helpful");
        assert_eq!(system.role, Role::System);

        let tool = Message::tool_result("call_1", "Success");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id, Some("call_1".to_string()));
        assert!(tool.is_tool_result());
    }

    #[test]
    fn test_assistant_with_tools() {
        let tc = ToolCallRecord::new("call_1", "search", r#"{"q": "rust"}"#);
        let msg = Message::assistant_with_tools("Searching...", vec![tc]);

        assert!(msg.has_tool_calls());
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
    }

    #[test]
    fn test_has_tool_calls_empty_list() {
        let msg = Message::assistant_with_tools("x", vec![]);
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::User).unwrap();
        assert_eq!(json, r#""user""#);
        let parsed: Role = serde_json::from_str(r#""tool""#).unwrap();
        assert_eq!(parsed, Role::Tool);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_message_serialization_skips_none() {
        let msg = Message::user("Hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("timestamp"));
    }

    #[test]
    fn test_meta_new() {
        let meta = SessionMeta::new("telegram:chat1");
        assert_eq!(meta.key, "telegram:chat1");
        assert_eq!(meta.created_at, meta.updated_at);
        assert_eq!(meta.last_consolidated, 0);
    }

    #[test]
    fn test_meta_serde_field_names() {
        let meta = SessionMeta::new("k");
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"key\""));
        assert!(json.contains("\"created_at\""));
        assert!(json.contains("\"updated_at\""));
        assert!(json.contains("\"last_consolidated\""));
    }

    #[test]
    fn test_meta_last_consolidated_defaults() {
        let meta: SessionMeta = serde_json::from_str(
            r#"{"key":"k","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(meta.last_consolidated, 0);
    }
}
