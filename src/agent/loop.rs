//! The agent loop: bounded LLM + tool iteration per inbound message.
//!
//! For each inbound message the loop produces one outbound reply by
//! alternating provider calls with tool executions until the model returns
//! a response with no tool calls, or the iteration ceiling is reached.
//!
//! Turns are NOT serialised per session: concurrent inbound messages with
//! the same session key may interleave at the provider. Each turn takes a
//! defensive `history()` snapshot before it starts, so it observes a
//! consistent prefix; appends from other turns become visible on the next
//! turn.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::error::{NanobotError, Result};
use crate::providers::{ChatMessage, ChatRequest, Provider};
use crate::session::{Message, Role, SessionManager};
use crate::tools::{ToolContext, ToolRegistry};

use super::context::process_media;
use super::memory::MemoryStore;

/// Default iteration ceiling per turn.
const DEFAULT_MAX_ITERATIONS: u32 = 40;

/// Live-history length that triggers memory consolidation after a turn.
const CONSOLIDATE_THRESHOLD: usize = 60;

/// Session key used by direct (CLI) mode.
pub const DIRECT_SESSION_KEY: &str = "direct";

/// Dependencies and settings for an [`AgentLoop`].
pub struct AgentLoopConfig {
    pub bus: Arc<MessageBus>,
    pub provider: Arc<dyn Provider>,
    pub sessions: Arc<SessionManager>,
    pub tools: Arc<ToolRegistry>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Iteration ceiling; 0 falls back to the default (40).
    pub max_iterations: u32,
    pub system_prompt: String,
    pub workspace: PathBuf,
    /// When set, long session histories are consolidated into MEMORY.md /
    /// HISTORY.md after a turn and the live window trimmed.
    pub memory: Option<Arc<MemoryStore>>,
}

/// Consumes inbound messages, drives the tool loop, and publishes replies.
pub struct AgentLoop {
    bus: Arc<MessageBus>,
    provider: Arc<dyn Provider>,
    sessions: Arc<SessionManager>,
    tools: Arc<ToolRegistry>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_iterations: u32,
    system_prompt: String,
    workspace: PathBuf,
    memory: Option<Arc<MemoryStore>>,
}

impl AgentLoop {
    pub fn new(config: AgentLoopConfig) -> Self {
        Self {
            bus: config.bus,
            provider: config.provider,
            sessions: config.sessions,
            tools: config.tools,
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_iterations: if config.max_iterations == 0 {
                DEFAULT_MAX_ITERATIONS
            } else {
                config.max_iterations
            },
            system_prompt: config.system_prompt,
            workspace: config.workspace,
            memory: config.memory,
        }
    }

    /// Consume inbound messages until `cancel` fires or the bus closes.
    /// Each message is processed in its own task.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        info!("Agent loop started");
        loop {
            let msg = match self.bus.consume_inbound(&cancel).await {
                Ok(msg) => msg,
                Err(NanobotError::Cancelled) => {
                    info!("Agent loop cancelled");
                    return Ok(());
                }
                Err(e) => {
                    info!("Agent loop stopping: {}", e);
                    return Ok(());
                }
            };

            let loop_ref = Arc::clone(&self);
            let turn_cancel = cancel.child_token();
            let span = info_span!(
                "turn",
                request_id = %Uuid::new_v4(),
                session = %msg.session_key(),
                channel = %msg.channel,
                sender = %msg.sender_id,
            );
            tokio::spawn(
                async move {
                    loop_ref.process_message(&turn_cancel, msg).await;
                }
                .instrument(span),
            );
        }
    }

    /// Handle one inbound message end-to-end: run the tool loop, persist
    /// the turn, publish the reply. Failures publish an error-typed
    /// outbound to the origin chat and persist nothing.
    pub async fn process_message(&self, cancel: &CancellationToken, msg: InboundMessage) {
        let session = self.sessions.get_or_create(&msg.session_key()).await;

        let mut messages = to_chat_messages(&session.history().await);
        let mut user_msg = ChatMessage::user(&msg.content);
        if !msg.media.is_empty() {
            user_msg.content_parts = process_media(&msg.media);
        }
        messages.push(user_msg);

        let tool_ctx = ToolContext::new()
            .with_channel(&msg.channel, &msg.chat_id)
            .with_workspace(&self.workspace.to_string_lossy())
            .with_cancel(cancel.clone());

        match self.run_tool_loop(cancel, messages, &tool_ctx).await {
            Ok(final_content) => {
                session.append(Message::user(&msg.content)).await;
                session.append(Message::assistant(&final_content)).await;
                if let Err(e) = self.sessions.save(&session).await {
                    error!(error = %e, "Failed to save session");
                }
                if let Err(e) = self
                    .bus
                    .publish_outbound(OutboundMessage::reply_to(&msg, &final_content))
                    .await
                {
                    error!(error = %e, "Failed to publish reply");
                }
                self.maybe_consolidate(&session).await;
            }
            Err(e) if e.is_cancelled() => {
                info!("Turn cancelled");
            }
            Err(e) => {
                error!(error = %e, "Agent turn failed");
                let out =
                    OutboundMessage::error(&msg.channel, &msg.chat_id, &format!("Error: {}", e));
                if let Err(publish_err) = self.bus.publish_outbound(out).await {
                    error!(error = %publish_err, "Failed to publish error reply");
                }
            }
        }
    }

    /// Direct mode: run one turn against the synthetic `direct` session
    /// without touching the bus, returning the final text.
    pub async fn process_direct(&self, cancel: &CancellationToken, input: &str) -> Result<String> {
        let session = self.sessions.get_or_create(DIRECT_SESSION_KEY).await;

        let mut messages = to_chat_messages(&session.history().await);
        messages.push(ChatMessage::user(input));

        let tool_ctx = ToolContext::new()
            .with_channel("cli", DIRECT_SESSION_KEY)
            .with_workspace(&self.workspace.to_string_lossy())
            .with_cancel(cancel.clone());

        let final_content = self.run_tool_loop(cancel, messages, &tool_ctx).await?;

        session.append(Message::user(input)).await;
        session.append(Message::assistant(&final_content)).await;
        if let Err(e) = self.sessions.save(&session).await {
            error!(error = %e, "Failed to save direct session");
        }
        self.maybe_consolidate(&session).await;

        Ok(final_content)
    }

    /// Consolidate the live window into durable memory once it grows past
    /// the threshold, then advance the session's cursor. Best-effort: a
    /// failed consolidation leaves the cursor where it was.
    async fn maybe_consolidate(&self, session: &crate::session::Session) {
        let Some(memory) = &self.memory else {
            return;
        };
        let history = session.history().await;
        if history.len() < CONSOLIDATE_THRESHOLD {
            return;
        }

        let messages = to_chat_messages(&history);
        match memory
            .consolidate(Arc::clone(&self.provider), &self.model, messages)
            .await
        {
            Ok(()) => {
                session.set_consolidated(session.len().await).await;
                if let Err(e) = self.sessions.save(session).await {
                    error!(error = %e, "Failed to save session after consolidation");
                }
                info!(consolidated = history.len(), "Session history consolidated");
            }
            Err(e) => {
                error!(error = %e, "Memory consolidation failed");
            }
        }
    }

    /// The bounded LLM + tool iteration. Returns the model's final text.
    async fn run_tool_loop(
        &self,
        cancel: &CancellationToken,
        mut messages: Vec<ChatMessage>,
        tool_ctx: &ToolContext,
    ) -> Result<String> {
        let tool_defs = self.tools.definitions();

        for iteration in 0..self.max_iterations {
            let req = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                system_prompt: self.system_prompt.clone(),
            };

            let resp = tokio::select! {
                _ = cancel.cancelled() => return Err(NanobotError::Cancelled),
                resp = self.provider.chat(req) => {
                    resp.map_err(|e| match e {
                        NanobotError::Cancelled => NanobotError::Cancelled,
                        other => NanobotError::Provider(format!("provider chat error: {}", other)),
                    })?
                }
            };

            let mut assistant = ChatMessage::assistant(&resp.content);
            assistant.tool_calls = resp.tool_calls.clone();
            messages.push(assistant);

            if resp.tool_calls.is_empty() {
                return Ok(resp.content);
            }

            for tc in &resp.tool_calls {
                debug!(tool = %tc.name, id = %tc.id, iteration, "Executing tool");
                let args: Value = match serde_json::from_str(&tc.arguments) {
                    Ok(v) => v,
                    Err(e) => {
                        serde_json::json!({"_parse_error": format!("Invalid arguments JSON: {}", e)})
                    }
                };
                let result = self.tools.execute(&tc.name, args, tool_ctx).await;
                messages.push(ChatMessage::tool_result(&tc.id, &result));
            }
        }

        // Ceiling reached: fall back to the most recent assistant content.
        for msg in messages.iter().rev() {
            if msg.role == "assistant" {
                return Ok(msg.content.clone());
            }
        }
        Err(NanobotError::Provider(format!(
            "max iterations ({}) reached without a final response",
            self.max_iterations
        )))
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Convert session history to provider message format.
fn to_chat_messages(history: &[Message]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|m| ChatMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            }
            .to_string(),
            content: m.content.clone(),
            content_parts: Vec::new(),
            tool_call_id: m.tool_call_id.clone(),
            tool_calls: m
                .tool_calls
                .as_ref()
                .map(|tcs| {
                    tcs.iter()
                        .map(|tc| {
                            crate::providers::ToolCall::new(&tc.id, &tc.name, &tc.arguments)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}
