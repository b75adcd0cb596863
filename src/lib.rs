//! nanobot — a data-driven conversational agent framework
//!
//! A long-running process that ingests messages from chat platforms, runs a
//! bounded agent loop alternating LLM completions with tool invocations,
//! and dispatches responses back out. See `bus` for the message fabric,
//! `agent` for the loop, and `tools` for the execution surface.

pub mod agent;
pub mod bus;
pub mod channels;
pub mod cli;
pub mod config;
pub mod cron;
pub mod error;
pub mod heartbeat;
pub mod providers;
pub mod session;
pub mod tools;

pub use bus::{InboundMessage, Media, MediaKind, MessageBus, OutboundKind, OutboundMessage};
pub use config::Config;
pub use error::{NanobotError, Result};
pub use providers::{ChatMessage, ChatRequest, ChatResponse, Provider, ToolCall, ToolDef, Usage};
pub use session::{Message, Role, Session, SessionManager};
