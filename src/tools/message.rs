//! Messaging tool: `send_message` publishes an outbound message to any
//! channel/chat directly from a tool call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::{NanobotError, Result};

use super::{Tool, ToolContext};

/// Send a message to a specific channel and chat.
pub struct SendMessageTool {
    bus: Arc<MessageBus>,
}

impl SendMessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a specific channel and chat"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": {"type": "string", "description": "Target channel name"},
                "chat_id": {"type": "string", "description": "Target chat ID"},
                "content": {"type": "string", "description": "Message content"}
            },
            "required": ["channel", "chat_id", "content"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let channel = args.get("channel").and_then(|v| v.as_str()).unwrap_or("");
        let chat_id = args.get("chat_id").and_then(|v| v.as_str()).unwrap_or("");
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");

        if channel.is_empty() || chat_id.is_empty() || content.is_empty() {
            return Err(NanobotError::Tool(
                "channel, chat_id, and content are required".into(),
            ));
        }

        self.bus
            .publish_outbound(OutboundMessage::new(channel, chat_id, content))
            .await?;
        Ok("Message sent".to_string())
    }
}
