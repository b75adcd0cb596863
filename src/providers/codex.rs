//! Codex provider — OpenAI Responses API with OAuth token refresh.
//!
//! Auth state lives in `~/.codex/auth.json` (`access_token`,
//! `refresh_token`, `expires_at`). The access token is refreshed when it is
//! within 60 seconds of expiry. Responses arrive as an SSE stream; this
//! adapter assembles the events into one completed `ChatResponse`.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{NanobotError, Result};

use super::types::{ChatRequest, ChatResponse, Provider, ToolCall, Usage};

const RESPONSES_API_URL: &str = "https://api.openai.com/v1/responses";
const TOKEN_REFRESH_URL: &str = "https://auth.openai.com/oauth/token";

/// Persisted OAuth state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CodexAuth {
    access_token: String,
    refresh_token: String,
    /// Unix timestamp
    #[serde(default)]
    expires_at: i64,
}

/// Responses-API provider authenticated via OAuth.
pub struct CodexProvider {
    auth: Mutex<CodexAuth>,
    api_url: String,
    refresh_url: String,
    client: Client,
}

impl CodexProvider {
    /// Read `~/.codex/auth.json` and construct the provider.
    pub fn new() -> Result<Self> {
        let auth_path = dirs::home_dir()
            .ok_or_else(|| NanobotError::Config("cannot determine home directory".into()))?
            .join(".codex")
            .join("auth.json");
        Self::from_auth_file(auth_path)
    }

    /// Construct from an explicit auth file path.
    pub fn from_auth_file(path: PathBuf) -> Result<Self> {
        let data = std::fs::read_to_string(&path).map_err(|e| {
            NanobotError::Config(format!("codex auth.json not found at {:?}: {}", path, e))
        })?;
        let auth: CodexAuth = serde_json::from_str(&data)?;
        Ok(Self::from_auth(auth, RESPONSES_API_URL, TOKEN_REFRESH_URL))
    }

    fn from_auth(auth: CodexAuth, api_url: &str, refresh_url: &str) -> Self {
        Self {
            auth: Mutex::new(auth),
            api_url: api_url.to_string(),
            refresh_url: refresh_url.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Return a valid access token, refreshing when close to expiry.
    async fn access_token(&self) -> Result<String> {
        let mut auth = self.auth.lock().await;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        if now < auth.expires_at - 60 {
            return Ok(auth.access_token.clone());
        }

        let response = self
            .client
            .post(&self.refresh_url)
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": auth.refresh_token,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NanobotError::Provider(format!(
                "token refresh returned status {}",
                response.status()
            )));
        }

        let refreshed: CodexAuth = response.json().await?;
        *auth = refreshed;
        Ok(auth.access_token.clone())
    }
}

#[async_trait]
impl Provider for CodexProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let token = self.access_token().await?;
        let payload = build_request(&req);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&token)
            .header("Accept", "text/event-stream")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NanobotError::Provider(format!(
                "codex API returned status {}",
                response.status()
            )));
        }

        parse_sse(response).await
    }

    fn name(&self) -> &str {
        "codex"
    }
}

fn build_request(req: &ChatRequest) -> ApiRequest {
    let mut items = Vec::new();
    for m in &req.messages {
        match m.role.as_str() {
            "user" | "assistant" => {
                if !m.content.is_empty() || m.tool_calls.is_empty() {
                    items.push(InputItem::Message {
                        role: m.role.clone(),
                        content: m.content.clone(),
                    });
                }
                for tc in &m.tool_calls {
                    items.push(InputItem::FunctionCall {
                        call_id: tc.id.clone(),
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    });
                }
            }
            "tool" => items.push(InputItem::FunctionCallOutput {
                call_id: m.tool_call_id.clone().unwrap_or_default(),
                output: m.content.clone(),
            }),
            // system content becomes instructions below
            _ => {}
        }
    }

    let mut instructions = req.system_prompt.clone();
    if instructions.is_empty() {
        if let Some(sys) = req.messages.iter().find(|m| m.role == "system") {
            instructions = sys.content.clone();
        }
    }

    ApiRequest {
        model: req.model.clone(),
        instructions: if instructions.is_empty() {
            None
        } else {
            Some(instructions)
        },
        input: items,
        tools: req
            .tools
            .iter()
            .map(|t| ApiTool {
                kind: "function".into(),
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect(),
        stream: true,
    }
}

/// Assemble a single response from the SSE event stream.
///
/// Events of interest: `response.output_item.done` delivers completed
/// message/function_call items, `response.completed` carries usage.
async fn parse_sse(response: reqwest::Response) -> Result<ChatResponse> {
    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut usage = Usage::default();

    let mut stream = response.bytes_stream();
    let mut line_buffer = String::new();
    let mut data_line: Option<String> = None;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| NanobotError::Provider(format!("SSE read error: {}", e)))?;
        line_buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline_pos) = line_buffer.find('\n') {
            let line = line_buffer[..newline_pos].trim_end_matches('\r').to_string();
            line_buffer.drain(..=newline_pos);

            if let Some(data) = line.strip_prefix("data: ") {
                data_line = Some(data.to_string());
                continue;
            }
            // An empty line terminates one SSE event.
            if !line.is_empty() {
                continue;
            }
            let Some(data) = data_line.take() else {
                continue;
            };
            if data == "[DONE]" {
                continue;
            }
            let Ok(event) = serde_json::from_str::<SseEvent>(&data) else {
                continue;
            };
            match event.kind.as_str() {
                "response.output_item.done" => {
                    if let Some(item) = event.item {
                        match item.kind.as_str() {
                            "message" => {
                                for part in item.content {
                                    if part.kind == "output_text" || part.kind == "text" {
                                        content.push_str(&part.text);
                                    }
                                }
                            }
                            "function_call" => {
                                tool_calls.push(ToolCall::new(
                                    &item.call_id,
                                    &item.name,
                                    &item.arguments,
                                ));
                            }
                            _ => {}
                        }
                    }
                }
                "response.completed" => {
                    if let Some(u) = event.response.and_then(|r| r.usage) {
                        usage = Usage::new(u.input_tokens, u.output_tokens);
                    }
                }
                _ => {}
            }
        }
    }

    let stop_reason = if tool_calls.is_empty() {
        "stop"
    } else {
        "tool_use"
    };

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        stop_reason: stop_reason.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    stream: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputItem {
    Message {
        role: String,
        content: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct SseEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    item: Option<OutputItem>,
    #[serde(default)]
    response: Option<ResponseBody>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContentPart>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
    #[serde(default)]
    call_id: String,
}

#[derive(Debug, Deserialize)]
struct OutputContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
