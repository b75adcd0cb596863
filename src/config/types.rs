//! Configuration schema. All types deserialize from the JSON config file
//! with `#[serde(default)]`, so a partial file overlays the defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tools::mcp::McpServerConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub agents: AgentsConfig,
    pub tools: ToolsConfig,
    pub channels: ChannelsConfig,
    pub gateway: GatewayConfig,
    /// MCP server name -> sub-process configuration
    pub mcp: HashMap<String, McpServerConfig>,
}

/// API keys and endpoints per provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub openrouter: ProviderConfig,
    pub custom: ProviderConfig,
}

/// One provider's credentials and defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "defaultModel")]
    pub default_model: String,
}

/// Agent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

/// Default agent parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory; a leading `~/` is expanded at load time
    pub workspace: String,
    pub model: String,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(rename = "maxToolIterations")]
    pub max_tool_iterations: u32,
    /// Heartbeat tick interval in seconds (0 = service default)
    #[serde(rename = "heartbeatIntervalSecs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.nanobot/workspace".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_tool_iterations: 40,
            heartbeat_interval_secs: 0,
        }
    }
}

/// Tool enable/disable lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

/// Channel adapter configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramConfig>,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: String,
    #[serde(rename = "allowedUsers")]
    pub allowed_users: Vec<String>,
}

/// Gateway process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
