//! Web tool: `web_get` fetches a URL and returns its text content with
//! HTML markup stripped and size bounded.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::{NanobotError, Result};

use super::{Tool, ToolContext};

const MAX_WEB_CONTENT_LEN: usize = 100 * 1024;

/// Fetch a URL and return its text content.
pub struct WebGetTool {
    client: reqwest::Client,
}

impl WebGetTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .user_agent(concat!("nanobot/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl Default for WebGetTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebGetTool {
    fn name(&self) -> &str {
        "web_get"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its text content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "URL to fetch"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| NanobotError::Tool("url is required".into()))?;

        let request = self.client.get(url).send();
        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(NanobotError::Cancelled),
            resp = request => resp.map_err(|e| NanobotError::Tool(format!("failed to fetch URL: {}", e)))?,
        };

        if !response.status().is_success() {
            return Err(NanobotError::Tool(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NanobotError::Tool(format!("failed to read response: {}", e)))?;
        let body = if body.len() > MAX_WEB_CONTENT_LEN {
            let mut cut = MAX_WEB_CONTENT_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body[..cut].to_string()
        } else {
            body
        };

        Ok(clean_whitespace(&strip_html(&body)))
    }
}

/// Remove script/style blocks and tags, decode a few common entities.
fn strip_html(input: &str) -> String {
    // Cheap tag stripping, good enough for tool output fed to a model.
    let script_re = Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap();
    let tag_re = Regex::new(r"(?s)<[^>]*>").unwrap();

    let without_blocks = script_re.replace_all(input, " ");
    let without_tags = tag_re.replace_all(&without_blocks, " ");

    without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Collapse runs of whitespace, preserving paragraph-ish line breaks.
fn clean_whitespace(input: &str) -> String {
    let mut lines = Vec::new();
    for line in input.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}
