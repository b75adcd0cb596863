//! Provider types: the uniform `Chat` contract every LLM adapter implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The uniform LLM provider contract.
///
/// Adapters may stream internally (SSE) or make a single HTTP call, but
/// every implementation surfaces one completed response. Cancellation is
/// cooperative: callers drop the future (or race it against a token) and
/// the underlying request is aborted.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send a chat completion request.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// The provider name (e.g. "anthropic", "openai").
    fn name(&self) -> &str;
}

/// A chat completion request in provider-neutral form.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call
    pub tools: Vec<ToolDef>,
    /// Max tokens to generate (0 = provider default)
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// System prompt, handled out-of-band by providers that need it
    pub system_prompt: String,
}

/// A provider-format message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", "assistant", or "tool"
    pub role: String,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Multimodal content parts; when non-empty, providers that support
    /// multimodal input prefer these over `content`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_parts: Vec<ContentPart>,
    /// Back-reference for tool results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
            content_parts: Vec::new(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
            content_parts: Vec::new(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.to_string(),
            content_parts: Vec::new(),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: Vec::new(),
        }
    }

    /// Attach multimodal parts (builder pattern).
    pub fn with_parts(mut self, parts: Vec<ContentPart>) -> Self {
        self.content_parts = parts;
        self
    }
}

/// A part of a multimodal message: text or an image reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// An image reference: http(s) URL or `data:` URI, with a detail level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default = "default_detail")]
    pub detail: String,
}

fn default_detail() -> String {
    "auto".to_string()
}

impl ImageUrl {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            detail: default_detail(),
        }
    }
}

/// A tool call returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// Raw JSON argument string
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// A tool declaration sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Unique tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for the parameters object
    pub parameters: serde_json::Value,
}

impl ToolDef {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// The completed response from a chat call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Text content (may be empty when only tool calls are present)
    pub content: String,
    /// Tool calls in provider order
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, when reported
    #[serde(default)]
    pub usage: Usage,
    /// Provider stop reason (e.g. "end_turn", "tool_use", "stop")
    #[serde(default)]
    pub stop_reason: String,
}

impl ChatResponse {
    /// A plain text response, for stubs and tests.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// A response carrying tool calls.
    pub fn with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            ..Default::default()
        }
    }

    /// Whether the response contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
