//! Context builder: assembles the system prompt from workspace files and
//! runtime state, and converts inbound media into multimodal content parts.

use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Utc;

use crate::bus::Media;
use crate::providers::{ContentPart, ImageUrl};
use crate::tools::ToolRegistry;

/// Workspace files concatenated, in this order, into the system prompt.
pub const BOOTSTRAP_FILES: &[&str] = &[
    "AGENTS.md",
    "SOUL.md",
    "USER.md",
    "TOOLS.md",
    "IDENTITY.md",
];

/// Builds the system prompt for agent turns.
pub struct ContextBuilder {
    workspace: PathBuf,
}

impl ContextBuilder {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    /// Read the bootstrap files that exist and join them with separators,
    /// then append memory, skills, and runtime-context sections.
    ///
    /// Sections appear only when non-empty; the runtime context block is
    /// always present and carries the current RFC-3339 time, the workspace
    /// path, and the comma-joined registered tool names.
    pub fn build_system_prompt(
        &self,
        memory_content: &str,
        skills_content: &str,
        tools: &ToolRegistry,
    ) -> String {
        let mut parts = Vec::new();
        for name in BOOTSTRAP_FILES {
            if let Ok(content) = std::fs::read_to_string(self.workspace.join(name)) {
                parts.push(content);
            }
        }
        let mut base = parts.join("\n\n---\n\n");

        if !memory_content.is_empty() {
            base.push_str("\n\n## Memory\n\n");
            base.push_str(memory_content);
        }
        if !skills_content.is_empty() {
            base.push_str("\n\n## Available Skills\n\n");
            base.push_str(skills_content);
        }

        base.push_str(&format!(
            "\n\n## Runtime Context\n- Current time: {}\n- Workspace: {}\n- Available tools: {}",
            Utc::now().to_rfc3339(),
            self.workspace.display(),
            tools.names().join(", ")
        ));

        base
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Convert inbound media items to image-URL content parts.
///
/// Inline bytes are base64-encoded into a `data:` URI (MIME auto-detected
/// when missing); local paths are read and encoded the same way; http(s)
/// URLs pass through. Unreadable items are silently dropped.
pub fn process_media(media: &[Media]) -> Vec<ContentPart> {
    let mut parts = Vec::new();
    for item in media {
        if let Some(data) = &item.data {
            let mime = item
                .mime_type
                .clone()
                .unwrap_or_else(|| detect_mime(data).to_string());
            parts.push(data_uri_part(&mime, data));
            continue;
        }
        match item.url.as_deref() {
            Some(url) if is_remote_url(url) => {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl::new(url),
                });
            }
            Some(path) if !path.is_empty() => {
                let Ok(data) = std::fs::read(path) else {
                    continue;
                };
                let mime = item
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| detect_mime(&data).to_string());
                parts.push(data_uri_part(&mime, &data));
            }
            _ => {}
        }
    }
    parts
}

fn data_uri_part(mime: &str, data: &[u8]) -> ContentPart {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    ContentPart::ImageUrl {
        image_url: ImageUrl::new(&format!("data:{};base64,{}", mime, encoded)),
    }
}

fn is_remote_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Sniff a MIME type from magic bytes; octet-stream when unknown.
fn detect_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if data.starts_with(b"\xff\xd8\xff") {
        "image/jpeg"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else if data.len() > 11 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}
