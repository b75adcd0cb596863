//! Error types for nanobot
//!
//! One `thiserror` enum covers every subsystem. The conventions that matter:
//! `Cancelled` is a clean-shutdown signal and must never be logged as an
//! error, and tool failures are usually folded into the tool's result string
//! (see `tools::ToolRegistry`) rather than propagated here.

use thiserror::Error;

/// The primary error type for nanobot operations.
#[derive(Error, Debug)]
pub enum NanobotError {
    /// Configuration-related errors (invalid config, missing required fields).
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider errors (API failures, rate limits, malformed responses).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Channel errors (connection failures, message routing issues).
    #[error("Channel error: {0}")]
    Channel(String),

    /// Tool execution errors (invalid parameters, execution failures).
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session management errors (invalid state, persistence failures).
    #[error("Session error: {0}")]
    Session(String),

    /// MCP server communication errors (protocol errors, dead sub-process).
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Message bus lane closed.
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Operation cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Standard I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for nanobot operations.
pub type Result<T> = std::result::Result<T, NanobotError>;

impl NanobotError {
    /// Whether this error is a cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NanobotError::Cancelled)
    }
}
