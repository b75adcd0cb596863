//! Shared CLI wiring: provider resolution and full agent assembly.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::{
    AgentLoop, AgentLoopConfig, ContextBuilder, MemoryStore, SkillsLoader, SubagentManager,
};
use crate::bus::MessageBus;
use crate::config::Config;
use crate::cron::CronService;
use crate::providers::{self, AnthropicProvider, CodexProvider, OpenAiProvider, Provider};
use crate::session::SessionManager;
use crate::tools::mcp::{connect_mcp_servers, McpClient};
use crate::tools::{
    EditFileTool, ListDirTool, ManageCronTool, ReadFileTool, RunShellTool, SendMessageTool,
    SpawnTaskTool, ToolRegistry, WebGetTool, WriteFileTool,
};

/// Everything a running agent process owns; kept alive until shutdown.
pub struct AgentRuntime {
    pub agent: Arc<AgentLoop>,
    pub cron: Arc<CronService>,
    pub subagents: Arc<SubagentManager>,
    pub mcp_clients: Vec<Arc<McpClient>>,
    pub sessions: Arc<SessionManager>,
}

impl AgentRuntime {
    /// Shut down owned services (MCP sub-processes, cron) and flush
    /// sessions. The cancellation token handles the rest.
    pub async fn shutdown(&self) {
        self.cron.stop().await;
        for client in &self.mcp_clients {
            client.close().await;
        }
        self.sessions.flush_all().await;
    }
}

/// Pick a provider from config and model: explicit keys win over keyword
/// matching; a configured custom base URL selects the OpenAI-compatible
/// adapter against it.
pub fn resolve_provider(config: &Config, model: &str) -> Result<Arc<dyn Provider>> {
    let p = &config.providers;

    if !p.custom.base_url.is_empty() {
        return Ok(Arc::new(OpenAiProvider::with_base_url(
            &p.custom.api_key,
            &p.custom.base_url,
            if p.custom.default_model.is_empty() {
                model
            } else {
                &p.custom.default_model
            },
        )));
    }

    if let Some(spec) = providers::find_by_model(model) {
        match spec.name {
            "anthropic" if !p.anthropic.api_key.is_empty() => {
                return Ok(Arc::new(AnthropicProvider::new(&p.anthropic.api_key)));
            }
            "openai" if !p.openai.api_key.is_empty() => {
                return Ok(Arc::new(OpenAiProvider::new(&p.openai.api_key)));
            }
            "deepseek" if !p.deepseek.api_key.is_empty() => {
                return Ok(Arc::new(OpenAiProvider::with_base_url(
                    &p.deepseek.api_key,
                    spec.default_api_base,
                    model,
                )));
            }
            "codex" => {
                return Ok(Arc::new(CodexProvider::new()?));
            }
            _ => {}
        }
    }

    // Gateways route any model name.
    if !p.openrouter.api_key.is_empty() {
        return Ok(Arc::new(OpenAiProvider::with_base_url(
            &p.openrouter.api_key,
            providers::find_by_name("openrouter")
                .map(|s| s.default_api_base)
                .unwrap_or_default(),
            model,
        )));
    }

    // Fall back to whichever key exists.
    if !p.anthropic.api_key.is_empty() {
        return Ok(Arc::new(AnthropicProvider::new(&p.anthropic.api_key)));
    }
    if !p.openai.api_key.is_empty() {
        return Ok(Arc::new(OpenAiProvider::new(&p.openai.api_key)));
    }

    anyhow::bail!(
        "No AI provider configured. Set NANOBOT_PROVIDERS_ANTHROPIC_APIKEY (or another \
         provider key) or add it to {:?}",
        Config::default_path()
    )
}

/// Assemble the full agent runtime: provider, tools (local + MCP), context,
/// cron, sub-agents.
pub async fn create_agent(
    config: &Config,
    bus: Arc<MessageBus>,
    cancel: &CancellationToken,
    model_override: Option<&str>,
) -> Result<AgentRuntime> {
    let defaults = &config.agents.defaults;
    let model = model_override.unwrap_or(&defaults.model).to_string();
    let workspace = config.workspace_path();
    tokio::fs::create_dir_all(&workspace)
        .await
        .with_context(|| format!("failed to create workspace {:?}", workspace))?;

    let provider = resolve_provider(config, &model)?;
    info!(provider = provider.name(), model = %model, "Provider resolved");

    let sessions = Arc::new(SessionManager::new(config.sessions_dir()));

    let cron = Arc::new(CronService::new(config.cron_store_path(), Arc::clone(&bus)));
    cron.load_from_disk()
        .await
        .with_context(|| "failed to load cron store")?;
    cron.start(cancel.clone()).await;

    let subagents = Arc::new(SubagentManager::new(
        Arc::clone(&provider),
        &model,
        defaults.max_tokens,
        defaults.temperature,
        Arc::clone(&bus),
        &workspace.to_string_lossy(),
    ));

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(ReadFileTool));
    tools.register(Arc::new(WriteFileTool));
    tools.register(Arc::new(EditFileTool));
    tools.register(Arc::new(ListDirTool));
    tools.register(Arc::new(RunShellTool));
    tools.register(Arc::new(WebGetTool::new()));
    tools.register(Arc::new(SendMessageTool::new(Arc::clone(&bus))));
    tools.register(Arc::new(ManageCronTool::new(Arc::clone(&cron))));
    {
        let subagents_ref = Arc::clone(&subagents);
        let spawn_cancel = cancel.clone();
        tools.register(Arc::new(SpawnTaskTool::new(Arc::new(
            move |task, label, channel, chat_id| {
                subagents_ref.spawn(&spawn_cancel, &task, &label, &channel, &chat_id)
            },
        ))));
    }

    // Honour the enable/disable lists.
    if !config.tools.disabled.is_empty() || !config.tools.enabled.is_empty() {
        let mut filtered = ToolRegistry::new();
        for name in tools.names() {
            let enabled = config.tools.enabled.is_empty() || config.tools.enabled.contains(&name);
            let disabled = config.tools.disabled.contains(&name);
            if enabled && !disabled {
                if let Some(tool) = tools.get(&name) {
                    filtered.register(Arc::clone(tool));
                }
            }
        }
        tools = filtered;
    }

    let mcp_clients = connect_mcp_servers(cancel, &config.mcp, &mut tools).await;

    // System prompt: bootstrap files + memory + skills + runtime context.
    let memory = Arc::new(MemoryStore::new(workspace.clone()));
    let skills = SkillsLoader::new(&workspace);
    let mut memory_content = memory.read_memory().await;
    let always_skills = skills.get_always_skills();
    if !always_skills.is_empty() {
        if !memory_content.is_empty() {
            memory_content.push_str("\n\n");
        }
        memory_content.push_str(&always_skills);
    }
    let skills_summary = skills.build_skills_summary();
    let context_builder = ContextBuilder::new(workspace.clone());
    let system_prompt =
        context_builder.build_system_prompt(&memory_content, &skills_summary, &tools);

    let agent = Arc::new(AgentLoop::new(AgentLoopConfig {
        bus,
        provider,
        sessions: Arc::clone(&sessions),
        tools: Arc::new(tools),
        model,
        max_tokens: defaults.max_tokens,
        temperature: defaults.temperature,
        max_iterations: defaults.max_tool_iterations,
        system_prompt,
        workspace,
        memory: Some(memory),
    }));

    Ok(AgentRuntime {
        agent,
        cron,
        subagents,
        mcp_clients,
        sessions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_provider_no_keys_fails() {
        let config = Config::default();
        assert!(resolve_provider(&config, "gpt-4o").is_err());
    }

    #[test]
    fn test_resolve_provider_by_model_keyword() {
        let mut config = Config::default();
        config.providers.anthropic.api_key = "sk-ant".into();
        let provider = resolve_provider(&config, "claude-sonnet-4").unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn test_resolve_provider_custom_base_wins() {
        let mut config = Config::default();
        config.providers.custom.base_url = "http://localhost:8000/v1".into();
        config.providers.anthropic.api_key = "sk-ant".into();
        let provider = resolve_provider(&config, "claude-sonnet-4").unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_resolve_provider_openrouter_gateway() {
        let mut config = Config::default();
        config.providers.openrouter.api_key = "sk-or-xyz".into();
        let provider = resolve_provider(&config, "some/arbitrary-model").unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_resolve_provider_fallback_key() {
        let mut config = Config::default();
        config.providers.openai.api_key = "sk-x".into();
        // Unknown model keyword still routes to the only configured key.
        let provider = resolve_provider(&config, "mystery-model").unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[tokio::test]
    async fn test_create_agent_minimal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.agents.defaults.workspace = dir.path().to_string_lossy().to_string();
        config.providers.openai.api_key = "sk-test".into();

        let bus = Arc::new(MessageBus::new());
        let cancel = CancellationToken::new();
        let runtime = create_agent(&config, bus, &cancel, None).await.unwrap();

        assert_eq!(runtime.agent.model(), "gpt-4o");
        assert!(runtime.mcp_clients.is_empty());
        cancel.cancel();
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_agent_model_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.agents.defaults.workspace = dir.path().to_string_lossy().to_string();
        config.providers.anthropic.api_key = "sk-ant".into();

        let bus = Arc::new(MessageBus::new());
        let cancel = CancellationToken::new();
        let runtime = create_agent(&config, bus, &cancel, Some("claude-opus-4"))
            .await
            .unwrap();
        assert_eq!(runtime.agent.model(), "claude-opus-4");
        cancel.cancel();
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_agent_tool_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.agents.defaults.workspace = dir.path().to_string_lossy().to_string();
        config.providers.openai.api_key = "sk-test".into();
        config.tools.disabled = vec!["run_shell".into()];

        let bus = Arc::new(MessageBus::new());
        let cancel = CancellationToken::new();
        let runtime = create_agent(&config, bus, &cancel, None).await.unwrap();
        assert_eq!(runtime.agent.model(), "gpt-4o");
        cancel.cancel();
        runtime.shutdown().await;
    }
}
