//! Tool types: the `Tool` trait all tools implement, and the execution
//! context handed to them.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Trait that all tools must implement.
///
/// A tool is a named callable with a JSON-schema signature. Execution
/// returns a plain string; the registry turns errors into conversational
/// text for the model, so tools should return `Err` freely on bad input.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use nanobot::tools::{Tool, ToolContext};
/// use nanobot::error::Result;
///
/// struct PingTool;
///
/// #[async_trait]
/// impl Tool for PingTool {
///     fn name(&self) -> &str { "ping" }
///     fn description(&self) -> &str { "Replies with pong" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({"type": "object", "properties": {}})
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
///         Ok("pong".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool name; unique within a registry.
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameter object.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The originating channel name (e.g. "telegram")
    pub channel: Option<String>,
    /// The originating chat/conversation id
    pub chat_id: Option<String>,
    /// The workspace directory for file operations
    pub workspace: Option<String>,
    /// Cancellation token; tools running long operations should honour it
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the originating channel and chat id (builder pattern).
    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    /// Set the workspace directory (builder pattern).
    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }

    /// Set the cancellation token (builder pattern).
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_context_new() {
        let ctx = ToolContext::new();
        assert!(ctx.channel.is_none());
        assert!(ctx.chat_id.is_none());
        assert!(ctx.workspace.is_none());
        assert!(!ctx.cancel.is_cancelled());
    }

    #[test]
    fn test_tool_context_builder_chain() {
        let ctx = ToolContext::new()
            .with_channel("discord", "abc123")
            .with_workspace("/tmp/workspace");

        assert_eq!(ctx.channel.as_deref(), Some("discord"));
        assert_eq!(ctx.chat_id.as_deref(), Some("abc123"));
        assert_eq!(ctx.workspace.as_deref(), Some("/tmp/workspace"));
    }

    #[test]
    fn test_tool_context_with_cancel() {
        let token = CancellationToken::new();
        let ctx = ToolContext::new().with_cancel(token.clone());
        token.cancel();
        assert!(ctx.cancel.is_cancelled());
    }
}
