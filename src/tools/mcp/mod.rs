//! MCP (Model Context Protocol) support: a stdio JSON-RPC 2.0 client per
//! configured server, and wrappers that surface discovered tools in the
//! registry as `mcp_<server>_<tool>`.

mod client;
mod wrapper;

pub use client::{McpClient, McpServerConfig, McpToolDef};
pub use wrapper::McpToolWrapper;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Tool, ToolRegistry};

/// Connect to every configured MCP server and register its tools.
///
/// Servers that fail to connect or enumerate are logged and skipped; the
/// successfully connected clients are returned so the caller can close them
/// on shutdown.
pub async fn connect_mcp_servers(
    cancel: &CancellationToken,
    configs: &HashMap<String, McpServerConfig>,
    registry: &mut ToolRegistry,
) -> Vec<Arc<McpClient>> {
    let mut clients = Vec::new();

    for (name, config) in configs {
        let client = match McpClient::connect(name, config).await {
            Ok(client) => client,
            Err(e) => {
                warn!(target: "mcp", server = %name, error = %e, "Failed to connect to MCP server");
                continue;
            }
        };

        let tools = match client.list_tools(cancel).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(target: "mcp", server = %name, error = %e, "Failed to list MCP tools");
                client.close().await;
                continue;
            }
        };

        for def in &tools {
            let wrapper =
                McpToolWrapper::new(name, def, config.tool_timeout, Arc::clone(&client));
            info!(target: "mcp", server = %name, tool = %def.name, as_name = %wrapper.name(),
                  "Registered MCP tool");
            registry.register(Arc::new(wrapper));
        }

        clients.push(client);
    }

    clients
}
