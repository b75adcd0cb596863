//! MCP tool wrapper — exposes one MCP server tool through the `Tool` trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{NanobotError, Result};
use crate::tools::{Tool, ToolContext};

use super::client::{McpClient, McpToolDef};

/// Default per-call timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Wraps a single MCP server tool as a registry tool.
///
/// Registered names are `mcp_<server>_<tool>`, so MCP-originated tools can
/// never collide with local ones. Each call layers a timeout over the
/// caller's cancellation token; on timeout or cancel the sub-process stays
/// usable for further calls.
pub struct McpToolWrapper {
    tool_name: String,
    remote_name: String,
    description: String,
    input_schema: Value,
    timeout_secs: u64,
    client: Arc<McpClient>,
}

impl McpToolWrapper {
    /// Wrap a discovered tool definition.
    pub fn new(server_name: &str, def: &McpToolDef, timeout_secs: u64, client: Arc<McpClient>) -> Self {
        Self {
            tool_name: format!("mcp_{}_{}", server_name, def.name),
            remote_name: def.name.clone(),
            description: def.description.clone(),
            input_schema: def.input_schema.clone(),
            timeout_secs: if timeout_secs == 0 {
                DEFAULT_TOOL_TIMEOUT_SECS
            } else {
                timeout_secs
            },
            client,
        }
    }

    /// The unprefixed tool name on the MCP server.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let call = self.client.call_tool(&ctx.cancel, &self.remote_name, args);
        match tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), call).await {
            Ok(result) => result,
            Err(_) => Err(NanobotError::Mcp(format!(
                "tool {} timed out after {}s",
                self.tool_name, self.timeout_secs
            ))),
        }
    }
}
