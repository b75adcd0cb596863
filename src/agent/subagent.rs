//! Sub-agent manager: isolated background agent tasks.
//!
//! Each spawned task runs a cut-down tool loop (lower ceiling, filesystem
//! and shell tools only) against its own registry snapshot. Completion is
//! delivered by publishing a synthetic inbound message on the bus with
//! `channel = "system"` and the parent's session key as override, so the
//! parent observes it exactly like any other inbound message.
//!
//! Cancellation removes the running-task entry immediately; the child
//! discovers its token and returns without publishing, so a cancelled task
//! never injects a completion message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bus::{InboundMessage, MessageBus};
use crate::providers::{ChatMessage, ChatRequest, Provider};
use crate::tools::{
    EditFileTool, ListDirTool, ReadFileTool, RunShellTool, ToolContext, ToolRegistry,
    WriteFileTool,
};

/// Iteration ceiling for sub-agent loops.
const SUBAGENT_MAX_ITERATIONS: u32 = 15;

/// Spawns and tracks background task agents.
///
/// Cloning shares the running-task map, so any clone can cancel or list
/// tasks spawned through another.
#[derive(Clone)]
pub struct SubagentManager {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    bus: Arc<MessageBus>,
    workspace: String,
    state: Arc<Mutex<SubagentState>>,
}

struct SubagentState {
    running: HashMap<String, CancellationToken>,
    counter: u64,
}

impl SubagentManager {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        bus: Arc<MessageBus>,
        workspace: &str,
    ) -> Self {
        Self {
            provider,
            model: model.to_string(),
            max_tokens,
            temperature,
            bus,
            workspace: workspace.to_string(),
            state: Arc::new(Mutex::new(SubagentState {
                running: HashMap::new(),
                counter: 0,
            })),
        }
    }

    /// Start a background sub-agent. Returns its task id (`task_<n>`).
    ///
    /// The child context is forked from `parent`: cancelling either the
    /// parent or this task's own token stops the child.
    pub fn spawn(
        &self,
        parent: &CancellationToken,
        task: &str,
        label: &str,
        origin_channel: &str,
        origin_chat_id: &str,
    ) -> String {
        let (task_id, child_cancel) = {
            let mut state = self.state.lock().expect("subagent state poisoned");
            let task_id = format!("task_{}", state.counter);
            state.counter += 1;
            let child_cancel = parent.child_token();
            state.running.insert(task_id.clone(), child_cancel.clone());
            (task_id, child_cancel)
        };

        let manager = self.clone();
        let task = task.to_string();
        let label = if label.is_empty() {
            task_id.clone()
        } else {
            label.to_string()
        };
        let session_key = format!("{}:{}", origin_channel, origin_chat_id);
        let spawned_id = task_id.clone();

        tokio::spawn(async move {
            let result = manager.run_task(&child_cancel, &spawned_id, &task).await;

            // A cancelled task publishes nothing. Cancel also removes the
            // entry eagerly, so absence alone is not a cancellation signal.
            if child_cancel.is_cancelled() {
                info!(task_id = %spawned_id, "Sub-agent cancelled, suppressing completion");
            } else {
                let content = format!("[Subagent \"{}\" completed]\n\n{}", label, result);
                let inbound = InboundMessage::new("system", "subagent", &spawned_id, &content)
                    .with_session_key(&session_key)
                    .with_metadata("source", "subagent")
                    .with_metadata("task_id", &spawned_id);
                if let Err(e) = manager.bus.publish_inbound(inbound).await {
                    error!(task_id = %spawned_id, error = %e,
                           "Failed to publish sub-agent completion");
                }
            }

            let mut state = manager.state.lock().expect("subagent state poisoned");
            state.running.remove(&spawned_id);
        });

        task_id
    }

    /// Cancel a running sub-agent. Returns false for unknown ids.
    pub fn cancel(&self, task_id: &str) -> bool {
        let mut state = self.state.lock().expect("subagent state poisoned");
        match state.running.remove(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of currently running sub-agents, sorted.
    pub fn list_running(&self) -> Vec<String> {
        let state = self.state.lock().expect("subagent state poisoned");
        let mut ids: Vec<String> = state.running.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The cut-down tool loop. Any outcome (final text, provider error,
    /// exhausted ceiling) is rendered as the result string.
    async fn run_task(&self, cancel: &CancellationToken, task_id: &str, task: &str) -> String {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ReadFileTool));
        tools.register(Arc::new(WriteFileTool));
        tools.register(Arc::new(EditFileTool));
        tools.register(Arc::new(ListDirTool));
        tools.register(Arc::new(RunShellTool));

        let system_prompt = format!(
            "You are a focused task agent. Complete the following task:\n{}\n\n\
             Use the available tools to accomplish this task. Be thorough and report your findings.",
            task
        );

        let tool_defs = tools.definitions();
        let tool_ctx = ToolContext::new()
            .with_workspace(&self.workspace)
            .with_cancel(cancel.clone());
        let mut messages = vec![ChatMessage::user(task)];

        for _ in 0..SUBAGENT_MAX_ITERATIONS {
            let req = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                system_prompt: system_prompt.clone(),
            };

            let resp = tokio::select! {
                _ = cancel.cancelled() => return String::new(),
                resp = self.provider.chat(req) => match resp {
                    Ok(resp) => resp,
                    Err(e) => {
                        error!(task_id, error = %e, "Sub-agent provider error");
                        return format!("error: {}", e);
                    }
                },
            };

            let mut assistant = ChatMessage::assistant(&resp.content);
            assistant.tool_calls = resp.tool_calls.clone();
            messages.push(assistant);

            if resp.tool_calls.is_empty() {
                return resp.content;
            }

            for tc in &resp.tool_calls {
                debug!(task_id, tool = %tc.name, "Sub-agent executing tool");
                let args: Value = serde_json::from_str(&tc.arguments)
                    .unwrap_or_else(|e| {
                        serde_json::json!({"_parse_error": format!("Invalid arguments JSON: {}", e)})
                    });
                let result = tools.execute(&tc.name, args, &tool_ctx).await;
                messages.push(ChatMessage::tool_result(&tc.id, &result));
            }
        }

        // Ceiling exhausted: report the last assistant content.
        messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::providers::{ChatResponse, ToolCall};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        responses: Vec<ChatResponse>,
        calls: AtomicUsize,
        delay_ms: u64,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
                delay_ms: 0,
            }
        }

        fn slow(responses: Vec<ChatResponse>, delay_ms: u64) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
                delay_ms,
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = n.min(self.responses.len() - 1);
            Ok(self.responses[idx].clone())
        }
        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn make_manager(provider: Arc<dyn Provider>, bus: Arc<MessageBus>) -> Arc<SubagentManager> {
        Arc::new(SubagentManager::new(
            provider,
            "test-model",
            512,
            0.7,
            bus,
            "/tmp",
        ))
    }

    #[tokio::test]
    async fn test_spawn_completion_injected_as_inbound() {
        let bus = Arc::new(MessageBus::new());
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::text(
            "task finished",
        )]));
        let manager = make_manager(provider, Arc::clone(&bus));

        let cancel = CancellationToken::new();
        let task_id = manager
            .spawn(&cancel, "count the files", "counter", "telegram", "c7");
        assert_eq!(task_id, "task_0");

        let consume_cancel = CancellationToken::new();
        let msg = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            bus.consume_inbound(&consume_cancel),
        )
        .await
        .expect("completion not delivered")
        .unwrap();

        assert_eq!(msg.channel, "system");
        assert_eq!(msg.session_key(), "telegram:c7");
        assert!(msg.content.starts_with("[Subagent \"counter\" completed]\n\n"));
        assert!(msg.content.ends_with("task finished"));
    }

    #[tokio::test]
    async fn test_task_ids_increment() {
        let bus = Arc::new(MessageBus::new());
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::text("done")]));
        let manager = make_manager(provider, bus);

        let cancel = CancellationToken::new();
        let a = manager.spawn(&cancel, "a", "", "t", "c");
        let b = manager.spawn(&cancel, "b", "", "t", "c");
        assert_eq!(a, "task_0");
        assert_eq!(b, "task_1");
    }

    #[tokio::test]
    async fn test_cancel_unknown_id_returns_false() {
        let bus = Arc::new(MessageBus::new());
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::text("done")]));
        let manager = make_manager(provider, bus);
        assert!(!manager.cancel("task_99"));
    }

    #[tokio::test]
    async fn test_cancelled_task_publishes_nothing() {
        let bus = Arc::new(MessageBus::new());
        // Slow provider so the cancel lands before completion.
        let provider = Arc::new(ScriptedProvider::slow(
            vec![ChatResponse::text("never delivered")],
            500,
        ));
        let manager = make_manager(provider, Arc::clone(&bus));

        let cancel = CancellationToken::new();
        let task_id = manager.spawn(&cancel, "slow task", "slow", "t", "c");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(manager.cancel(&task_id));

        // Entry removed eagerly on cancel.
        assert!(manager.list_running().is_empty());

        // No completion message may arrive.
        let consume_cancel = CancellationToken::new();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(800),
            bus.consume_inbound(&consume_cancel),
        )
        .await;
        assert!(result.is_err(), "cancelled sub-agent must not publish");
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_child() {
        let bus = Arc::new(MessageBus::new());
        let provider = Arc::new(ScriptedProvider::slow(
            vec![ChatResponse::text("never")],
            500,
        ));
        let manager = make_manager(provider, Arc::clone(&bus));

        let parent = CancellationToken::new();
        manager.spawn(&parent, "task", "l", "t", "c");
        parent.cancel();

        let consume_cancel = CancellationToken::new();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(800),
            bus.consume_inbound(&consume_cancel),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_running_drains_after_completion() {
        let bus = Arc::new(MessageBus::new());
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::text("done")]));
        let manager = make_manager(provider, Arc::clone(&bus));

        let cancel = CancellationToken::new();
        manager.spawn(&cancel, "quick", "", "t", "c");

        // Wait for the completion to be published, then the map must be empty.
        let consume_cancel = CancellationToken::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            bus.consume_inbound(&consume_cancel),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(manager.list_running().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_reported_in_completion() {
        struct FailingProvider;

        #[async_trait]
        impl Provider for FailingProvider {
            async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
                Err(crate::error::NanobotError::Provider("boom".into()))
            }
            fn name(&self) -> &str {
                "failing"
            }
        }

        let bus = Arc::new(MessageBus::new());
        let manager = make_manager(Arc::new(FailingProvider), Arc::clone(&bus));

        let cancel = CancellationToken::new();
        manager.spawn(&cancel, "doomed", "d", "t", "c");

        let consume_cancel = CancellationToken::new();
        let msg = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            bus.consume_inbound(&consume_cancel),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(msg.content.contains("error: "));
        assert!(msg.content.contains("boom"));
    }

    #[tokio::test]
    async fn test_subagent_tool_loop_executes_tools() {
        let bus = Arc::new(MessageBus::new());
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, "hello from file").unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![
            ChatResponse::with_tools(
                "",
                vec![ToolCall::new(
                    "tc1",
                    "read_file",
                    &format!(r#"{{"path":"{}"}}"#, file.display()),
                )],
            ),
            ChatResponse::text("read the note"),
        ]));
        let manager = make_manager(provider, Arc::clone(&bus));

        let cancel = CancellationToken::new();
        manager.spawn(&cancel, "read note.txt", "reader", "t", "c");

        let consume_cancel = CancellationToken::new();
        let msg = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            bus.consume_inbound(&consume_cancel),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(msg.content.ends_with("read the note"));
    }
}
