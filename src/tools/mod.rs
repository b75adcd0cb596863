//! Tools module — tool definitions and execution for LLM function calling
//!
//! - `Tool` trait: the interface all tools implement
//! - `ToolContext`: execution context (channel, chat id, workspace, cancel)
//! - `ToolRegistry`: name→tool mapping with errors-as-data execution
//! - `mcp`: stdio JSON-RPC client exposing external tools as
//!   `mcp_<server>_<tool>`
//!
//! The stable local tool names are `read_file`, `write_file`, `edit_file`,
//! `list_dir`, `run_shell`, `web_get`, `send_message`, `spawn_task`, and
//! `manage_cron`.

pub mod cron;
pub mod filesystem;
pub mod mcp;
pub mod message;
mod registry;
pub mod shell;
pub mod spawn;
mod types;
pub mod web;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolContext};

pub use cron::ManageCronTool;
pub use filesystem::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use message::SendMessageTool;
pub use shell::RunShellTool;
pub use spawn::{SpawnFunc, SpawnTaskTool};
pub use web::WebGetTool;
