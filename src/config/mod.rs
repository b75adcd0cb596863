//! Configuration loading: defaults, then the JSON file, then `NANOBOT_*`
//! environment overrides, then `~` expansion on the workspace path.

mod types;

pub use types::{
    AgentDefaults, AgentsConfig, ChannelsConfig, Config, GatewayConfig, ProviderConfig,
    ProvidersConfig, TelegramConfig, ToolsConfig,
};

use std::path::{Path, PathBuf};

use crate::error::{NanobotError, Result};

impl Config {
    /// The default config file path: `~/.nanobot/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nanobot")
            .join("config.json")
    }

    /// Load from the default path.
    pub fn load() -> Result<Config> {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NanobotError::Config(format!("failed to open config file {:?}: {}", path, e))
        })?;
        Self::load_from_str(&content)
    }

    /// Parse config JSON (defaults overlaid), then apply env overrides and
    /// workspace expansion.
    pub fn load_from_str(content: &str) -> Result<Config> {
        let mut config: Config = serde_json::from_str(content)
            .map_err(|e| NanobotError::Config(format!("failed to parse config: {}", e)))?;
        apply_env_overrides(&mut config);
        expand_workspace(&mut config);
        Ok(config)
    }

    /// The workspace as an absolute path.
    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(&self.agents.defaults.workspace)
    }

    /// Directory for session files: `<workspace>/sessions`.
    pub fn sessions_dir(&self) -> PathBuf {
        self.workspace_path().join("sessions")
    }

    /// Path for the cron job store: `<workspace>/cron.json`.
    pub fn cron_store_path(&self) -> PathBuf {
        self.workspace_path().join("cron.json")
    }
}

/// Apply `NANOBOT_<SECTION>_<SUBSECTION>_<FIELD>` environment overrides.
/// All overridable values are string-typed.
fn apply_env_overrides(config: &mut Config) {
    let overrides: [(&str, &mut String); 8] = [
        (
            "NANOBOT_PROVIDERS_OPENAI_APIKEY",
            &mut config.providers.openai.api_key,
        ),
        (
            "NANOBOT_PROVIDERS_ANTHROPIC_APIKEY",
            &mut config.providers.anthropic.api_key,
        ),
        (
            "NANOBOT_PROVIDERS_DEEPSEEK_APIKEY",
            &mut config.providers.deepseek.api_key,
        ),
        (
            "NANOBOT_PROVIDERS_OPENROUTER_APIKEY",
            &mut config.providers.openrouter.api_key,
        ),
        (
            "NANOBOT_PROVIDERS_CUSTOM_APIKEY",
            &mut config.providers.custom.api_key,
        ),
        (
            "NANOBOT_PROVIDERS_CUSTOM_BASEURL",
            &mut config.providers.custom.base_url,
        ),
        (
            "NANOBOT_AGENTS_DEFAULTS_MODEL",
            &mut config.agents.defaults.model,
        ),
        (
            "NANOBOT_AGENTS_DEFAULTS_WORKSPACE",
            &mut config.agents.defaults.workspace,
        ),
    ];

    for (env, field) in overrides {
        if let Ok(value) = std::env::var(env) {
            if !value.is_empty() {
                *field = value;
            }
        }
    }
}

/// Expand a leading `~/` in the workspace path.
fn expand_workspace(config: &mut Config) {
    let ws = &config.agents.defaults.workspace;
    if let Some(rest) = ws.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            config.agents.defaults.workspace = home.join(rest).to_string_lossy().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_str_defaults() {
        let config = Config::load_from_str("{}").unwrap();
        assert_eq!(config.agents.defaults.model, "gpt-4o");
        // ~ expansion ran
        assert!(!config.agents.defaults.workspace.starts_with("~/"));
    }

    #[test]
    fn test_load_from_str_invalid_json() {
        let err = Config::load_from_str("not json").unwrap_err();
        assert!(matches!(err, NanobotError::Config(_)));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("failed to open config file"));
    }

    #[test]
    fn test_file_overlays_defaults() {
        let config = Config::load_from_str(
            r#"{"agents": {"defaults": {"model": "claude-sonnet-4", "maxTokens": 2048}}}"#,
        )
        .unwrap();
        assert_eq!(config.agents.defaults.model, "claude-sonnet-4");
        assert_eq!(config.agents.defaults.max_tokens, 2048);
        assert_eq!(config.agents.defaults.temperature, 0.7);
    }

    #[test]
    fn test_env_override_wins() {
        // Uses a field no other test asserts, since tests share the
        // process environment.
        std::env::set_var("NANOBOT_PROVIDERS_CUSTOM_APIKEY", "env-key");
        let config = Config::load_from_str(
            r#"{"providers": {"custom": {"apiKey": "file-key"}}}"#,
        )
        .unwrap();
        std::env::remove_var("NANOBOT_PROVIDERS_CUSTOM_APIKEY");
        assert_eq!(config.providers.custom.api_key, "env-key");
    }

    #[test]
    fn test_workspace_expansion() {
        let config =
            Config::load_from_str(r#"{"agents": {"defaults": {"workspace": "~/ws"}}}"#).unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                config.agents.defaults.workspace,
                home.join("ws").to_string_lossy()
            );
        }
    }

    #[test]
    fn test_derived_paths() {
        let config = Config::load_from_str(
            r#"{"agents": {"defaults": {"workspace": "/data/agent"}}}"#,
        )
        .unwrap();
        assert_eq!(config.sessions_dir(), PathBuf::from("/data/agent/sessions"));
        assert_eq!(
            config.cron_store_path(),
            PathBuf::from("/data/agent/cron.json")
        );
    }
}
