//! Providers module — LLM adapters behind one `Chat` contract
//!
//! The core only depends on the `Provider` trait; each adapter translates
//! between the neutral request/response types and its wire format:
//!
//! - [`AnthropicProvider`]: native messages API (JSON request/response)
//! - [`OpenAiProvider`]: chat-completions, works with any compatible base
//!   URL (OpenRouter, DeepSeek, local servers)
//! - [`CodexProvider`]: Responses API with OAuth token refresh and SSE
//!   assembly
//!
//! `registry` maps model names / API keys onto providers.

pub mod anthropic;
pub mod codex;
pub mod openai;
pub mod registry;
mod types;

pub use anthropic::AnthropicProvider;
pub use codex::CodexProvider;
pub use openai::OpenAiProvider;
pub use registry::{find_by_model, find_by_name, find_gateway, ProviderSpec, PROVIDER_SPECS};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, Provider, ToolCall, ToolDef,
    Usage,
};
