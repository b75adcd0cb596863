//! Static provider spec table: model-name keywords, API-key env vars, and
//! gateway detection used to pick a provider for a configured model.

/// Metadata describing one known provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Canonical provider name
    pub name: &'static str,
    /// Model-name keywords that select this provider
    pub keywords: &'static [&'static str],
    /// Environment variable holding the API key
    pub env_key: &'static str,
    /// Default API base URL (empty = provider-native default)
    pub default_api_base: &'static str,
    /// Multi-provider gateway (OpenRouter etc.)
    pub is_gateway: bool,
    /// Detect by API key prefix (e.g. "sk-or-" for OpenRouter)
    pub detect_by_key_prefix: &'static str,
    /// Detect by base-URL keyword
    pub detect_by_base_keyword: &'static str,
    /// Prefix prepended to model names when routed via this provider
    pub model_prefix: &'static str,
    /// Uses OAuth rather than API-key auth
    pub is_oauth: bool,
}

/// The registry of known LLM providers.
pub static PROVIDER_SPECS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openrouter",
        keywords: &["openrouter"],
        env_key: "OPENROUTER_API_KEY",
        default_api_base: "https://openrouter.ai/api/v1",
        is_gateway: true,
        detect_by_key_prefix: "sk-or-",
        detect_by_base_keyword: "openrouter",
        model_prefix: "",
        is_oauth: false,
    },
    ProviderSpec {
        name: "anthropic",
        keywords: &["claude", "anthropic"],
        env_key: "ANTHROPIC_API_KEY",
        default_api_base: "",
        is_gateway: false,
        detect_by_key_prefix: "",
        detect_by_base_keyword: "",
        model_prefix: "",
        is_oauth: false,
    },
    ProviderSpec {
        name: "openai",
        keywords: &["gpt", "o1", "o3", "chatgpt"],
        env_key: "OPENAI_API_KEY",
        default_api_base: "https://api.openai.com/v1",
        is_gateway: false,
        detect_by_key_prefix: "",
        detect_by_base_keyword: "",
        model_prefix: "",
        is_oauth: false,
    },
    ProviderSpec {
        name: "deepseek",
        keywords: &["deepseek"],
        env_key: "DEEPSEEK_API_KEY",
        default_api_base: "https://api.deepseek.com/v1",
        is_gateway: false,
        detect_by_key_prefix: "",
        detect_by_base_keyword: "deepseek",
        model_prefix: "",
        is_oauth: false,
    },
    ProviderSpec {
        name: "groq",
        keywords: &["groq"],
        env_key: "GROQ_API_KEY",
        default_api_base: "https://api.groq.com/openai/v1",
        is_gateway: false,
        detect_by_key_prefix: "",
        detect_by_base_keyword: "groq",
        model_prefix: "",
        is_oauth: false,
    },
    ProviderSpec {
        name: "ollama",
        keywords: &["ollama"],
        env_key: "",
        default_api_base: "http://localhost:11434/v1",
        is_gateway: false,
        detect_by_key_prefix: "",
        detect_by_base_keyword: "11434",
        model_prefix: "",
        is_oauth: false,
    },
    ProviderSpec {
        name: "codex",
        keywords: &["codex"],
        env_key: "",
        default_api_base: "",
        is_gateway: false,
        detect_by_key_prefix: "",
        detect_by_base_keyword: "",
        model_prefix: "",
        is_oauth: true,
    },
];

/// Match a model name against provider keywords; first match wins.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let lower = model.to_lowercase();
    PROVIDER_SPECS
        .iter()
        .find(|spec| spec.keywords.iter().any(|kw| lower.contains(kw)))
}

/// Detect a gateway provider from an API key prefix or base-URL keyword.
pub fn find_gateway(api_key: &str, base_url: &str) -> Option<&'static ProviderSpec> {
    PROVIDER_SPECS.iter().find(|spec| {
        (!spec.detect_by_key_prefix.is_empty() && api_key.starts_with(spec.detect_by_key_prefix))
            || (!spec.detect_by_base_keyword.is_empty()
                && !base_url.is_empty()
                && base_url.contains(spec.detect_by_base_keyword))
    })
}

/// Exact name lookup.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDER_SPECS.iter().find(|spec| spec.name == name)
}
