//! Sub-agent tool: `spawn_task` hands a task description to the sub-agent
//! manager via an injected callback, avoiding a direct dependency cycle.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NanobotError, Result};

use super::{Tool, ToolContext};

/// Callback that spawns a background task agent and returns its task id.
/// Arguments: task description, label, origin channel, origin chat id.
pub type SpawnFunc = Arc<dyn Fn(String, String, String, String) -> String + Send + Sync>;

/// Spawn a background task agent to work on a subtask.
pub struct SpawnTaskTool {
    spawn_fn: SpawnFunc,
}

impl SpawnTaskTool {
    pub fn new(spawn_fn: SpawnFunc) -> Self {
        Self { spawn_fn }
    }
}

#[async_trait]
impl Tool for SpawnTaskTool {
    fn name(&self) -> &str {
        "spawn_task"
    }

    fn description(&self) -> &str {
        "Spawn a background task agent to work on a subtask"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "Task description"},
                "label": {"type": "string", "description": "Short label for the task"}
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let task = args
            .get("task")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NanobotError::Tool("task is required".into()))?;
        let label = args
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let channel = ctx.channel.clone().unwrap_or_else(|| "system".to_string());
        let chat_id = ctx.chat_id.clone().unwrap_or_else(|| "system".to_string());

        let task_id = (self.spawn_fn)(task.to_string(), label, channel, chat_id);
        Ok(format!("Task spawned: {}", task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_spawn_task_invokes_callback() {
        let captured: Arc<Mutex<Option<(String, String, String, String)>>> =
            Arc::new(Mutex::new(None));
        let captured_clone = Arc::clone(&captured);

        let tool = SpawnTaskTool::new(Arc::new(move |task, label, channel, chat_id| {
            *captured_clone.lock().unwrap() = Some((task, label, channel, chat_id));
            "task_0".to_string()
        }));

        let ctx = ToolContext::new().with_channel("telegram", "c9");
        let result = tool
            .execute(json!({"task": "do the thing", "label": "thing"}), &ctx)
            .await
            .unwrap();

        assert_eq!(result, "Task spawned: task_0");
        let captured = captured.lock().unwrap().clone().unwrap();
        assert_eq!(captured.0, "do the thing");
        assert_eq!(captured.1, "thing");
        assert_eq!(captured.2, "telegram");
        assert_eq!(captured.3, "c9");
    }

    #[tokio::test]
    async fn test_spawn_task_requires_task() {
        let tool = SpawnTaskTool::new(Arc::new(|_, _, _, _| "task_0".to_string()));
        let err = tool
            .execute(json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("task is required"));
    }
}
