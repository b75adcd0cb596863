//! Memory store: LLM-driven consolidation into two workspace files.
//!
//! `MEMORY.md` holds durable facts and is overwritten on each
//! consolidation; `HISTORY.md` is an append-only timeline. The model is
//! instructed to call a single `save_memory(history_entry, memory_update)`
//! tool, whose arguments drive both writes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::{NanobotError, Result};
use crate::providers::{ChatMessage, ChatRequest, Provider, ToolDef};

const CONSOLIDATE_SYSTEM_PROMPT: &str = "Analyze the conversation and call save_memory with a \
one-line history entry and updated memory content capturing key facts about the user and context.";

/// Manages MEMORY.md and HISTORY.md in the workspace.
pub struct MemoryStore {
    workspace: PathBuf,
    /// Serialises all file writes.
    lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            lock: Mutex::new(()),
        }
    }

    /// Content of MEMORY.md, or empty when absent.
    pub async fn read_memory(&self) -> String {
        tokio::fs::read_to_string(self.workspace.join("MEMORY.md"))
            .await
            .unwrap_or_default()
    }

    /// Content of HISTORY.md, or empty when absent.
    pub async fn read_history(&self) -> String {
        tokio::fs::read_to_string(self.workspace.join("HISTORY.md"))
            .await
            .unwrap_or_default()
    }

    /// Ask the model to summarise `messages` and apply the resulting
    /// `save_memory` call: append a timestamped line to HISTORY.md and
    /// overwrite MEMORY.md.
    ///
    /// A response without a `save_memory` call is a no-op, not an error.
    pub async fn consolidate(
        &self,
        provider: Arc<dyn Provider>,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<()> {
        let save_memory_tool = ToolDef::new(
            "save_memory",
            "Save conversation summary to memory files",
            json!({
                "type": "object",
                "properties": {
                    "history_entry": {
                        "type": "string",
                        "description": "One-line summary for the HISTORY.md timeline"
                    },
                    "memory_update": {
                        "type": "string",
                        "description": "Updated content for MEMORY.md (key facts about the user and context)"
                    }
                },
                "required": ["history_entry"]
            }),
        );

        let req = ChatRequest {
            model: model.to_string(),
            messages,
            tools: vec![save_memory_tool],
            system_prompt: CONSOLIDATE_SYSTEM_PROMPT.to_string(),
            ..Default::default()
        };

        let resp = provider
            .chat(req)
            .await
            .map_err(|e| NanobotError::Provider(format!("failed to consolidate memory: {}", e)))?;

        #[derive(Deserialize)]
        struct SaveMemoryArgs {
            #[serde(default)]
            history_entry: String,
            #[serde(default)]
            memory_update: String,
        }

        for tc in &resp.tool_calls {
            if tc.name != "save_memory" {
                continue;
            }
            let args: SaveMemoryArgs = serde_json::from_str(&tc.arguments)
                .map_err(|e| NanobotError::Tool(format!("failed to parse save_memory args: {}", e)))?;

            let _guard = self.lock.lock().await;

            if !args.history_entry.is_empty() {
                let line = format!("[{}] {}\n", Utc::now().to_rfc3339(), args.history_entry);
                let path = self.workspace.join("HISTORY.md");
                let existing = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                tokio::fs::write(&path, existing + &line).await?;
            }

            if !args.memory_update.is_empty() {
                tokio::fs::write(self.workspace.join("MEMORY.md"), &args.memory_update).await?;
            }

            return Ok(());
        }

        Ok(())
    }
}
