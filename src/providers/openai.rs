//! OpenAI-compatible provider — chat-completions wire format.
//!
//! Works against api.openai.com and any compatible endpoint (OpenRouter,
//! DeepSeek, local inference servers) by swapping the base URL. Multimodal
//! messages are sent as content-part arrays; plain messages as strings.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NanobotError, Result};

use super::types::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart, Provider, ToolCall, ToolDef, Usage,
};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    default_model: String,
    /// Prefix applied to model names (gateway routing, e.g. "openai/").
    model_prefix: Option<String>,
    client: Client,
}

impl OpenAiProvider {
    /// Create a provider for api.openai.com.
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_BASE, DEFAULT_MODEL)
    }

    /// Create a provider against any compatible endpoint.
    pub fn with_base_url(api_key: &str, base_url: &str, default_model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            model_prefix: None,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Set a gateway model prefix (builder pattern).
    pub fn with_model_prefix(mut self, prefix: &str) -> Self {
        self.model_prefix = Some(prefix.to_string());
        self
    }

    fn resolve_model(&self, model: &str) -> String {
        let model = if model.is_empty() {
            self.default_model.as_str()
        } else {
            model
        };
        match &self.model_prefix {
            Some(prefix) if !model.starts_with(prefix.as_str()) => {
                format!("{}{}", prefix, model)
            }
            _ => model.to_string(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.system_prompt.is_empty() {
            messages.push(ApiMessage {
                role: "system".into(),
                content: ApiContentField::Text(req.system_prompt.clone()),
                tool_call_id: None,
                tool_calls: None,
            });
        }
        for m in &req.messages {
            messages.push(convert_message(m));
        }

        let request = ApiRequest {
            model: self.resolve_model(&req.model),
            messages,
            max_tokens: if req.max_tokens > 0 {
                Some(req.max_tokens)
            } else {
                None
            },
            temperature: Some(req.temperature),
            tools: if req.tools.is_empty() {
                None
            } else {
                Some(req.tools.iter().map(convert_tool).collect())
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NanobotError::Provider(format!(
                "openai-compatible endpoint returned {}: {}",
                status, body
            )));
        }

        let api_response: ApiResponse = response.json().await?;
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| NanobotError::Provider("no choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: Usage::new(
                api_response.usage.prompt_tokens,
                api_response.usage.completion_tokens,
            ),
            stop_reason: choice.finish_reason.unwrap_or_default(),
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn convert_message(m: &ChatMessage) -> ApiMessage {
    let content = if m.content_parts.is_empty() {
        // Some compatible backends reject empty-string content.
        let text = if m.content.is_empty() && m.tool_calls.is_empty() && m.role != "assistant" {
            " ".to_string()
        } else {
            m.content.clone()
        };
        ApiContentField::Text(text)
    } else {
        let mut parts: Vec<ContentPart> = Vec::new();
        if !m.content.is_empty() {
            parts.push(ContentPart::Text {
                text: m.content.clone(),
            });
        }
        parts.extend(m.content_parts.iter().cloned());
        ApiContentField::Parts(parts)
    };

    let tool_calls = if m.tool_calls.is_empty() {
        None
    } else {
        Some(
            m.tool_calls
                .iter()
                .map(|tc| ApiToolCall {
                    id: tc.id.clone(),
                    kind: "function".into(),
                    function: ApiFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    ApiMessage {
        role: m.role.clone(),
        content,
        tool_call_id: m.tool_call_id.clone(),
        tool_calls,
    }
}

fn convert_tool(tool: &ToolDef) -> ApiToolDef {
    ApiToolDef {
        kind: "function".into(),
        function: ApiFunctionDef {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiToolDef>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContentField,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContentField {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDef {
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionDef,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::ImageUrl;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn simple_request(content: &str) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::user(content)],
            tools: vec![],
            max_tokens: 512,
            temperature: 0.7,
            system_prompt: "Be brief.".into(),
        }
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Hi there"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url("k", &server.uri(), "gpt-4o");
        let resp = provider.chat(simple_request("Hello")).await.unwrap();
        assert_eq!(resp.content, "Hi there");
        assert_eq!(resp.stop_reason, "stop");
        assert_eq!(resp.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn test_chat_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "echo", "arguments": "{\"text\":\"hi\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url("k", &server.uri(), "gpt-4o");
        let resp = provider.chat(simple_request("use echo")).await.unwrap();
        assert!(resp.has_tool_calls());
        assert_eq!(resp.tool_calls[0].name, "echo");
        assert_eq!(resp.content, "");
    }

    #[tokio::test]
    async fn test_chat_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url("k", &server.uri(), "gpt-4o");
        let err = provider.chat(simple_request("Hello")).await.unwrap_err();
        assert!(matches!(err, NanobotError::Provider(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_chat_no_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"choices": [], "usage": {}})),
            )
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url("k", &server.uri(), "gpt-4o");
        let err = provider.chat(simple_request("Hello")).await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn test_resolve_model_prefix() {
        let provider =
            OpenAiProvider::with_base_url("k", "https://openrouter.ai/api/v1", "gpt-4o")
                .with_model_prefix("openai/");
        assert_eq!(provider.resolve_model("gpt-4o"), "openai/gpt-4o");
        assert_eq!(provider.resolve_model("openai/gpt-4o"), "openai/gpt-4o");
        assert_eq!(provider.resolve_model(""), "openai/gpt-4o");
    }

    #[test]
    fn test_convert_message_multimodal() {
        let msg = ChatMessage::user("look at this").with_parts(vec![ContentPart::ImageUrl {
            image_url: ImageUrl::new("data:image/png;base64,AAAA"),
        }]);
        let converted = convert_message(&msg);
        match converted.content {
            ApiContentField::Parts(parts) => {
                // Text content is prepended as the first part.
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], ContentPart::Text { .. }));
            }
            _ => panic!("expected parts"),
        }
    }

    #[test]
    fn test_convert_message_empty_user_content_coerced() {
        let msg = ChatMessage::user("");
        let converted = convert_message(&msg);
        match converted.content {
            ApiContentField::Text(t) => assert_eq!(t, " "),
            _ => panic!("expected text"),
        }
    }
}
