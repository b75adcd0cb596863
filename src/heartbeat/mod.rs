//! Heartbeat service: a periodic self-triggered decide-and-run hook.
//!
//! On each tick the service reads `HEARTBEAT.md` from the workspace (absent
//! file → skip) and asks the model, via a forced `heartbeat_decision` tool,
//! whether anything needs doing. On `run` it invokes the injected callback
//! with the decision's message; on `skip` (or anything else) it records the
//! reason and does nothing.
//!
//! The callback is responsible for avoiding recursion: it must not route
//! the decision back through a path that re-triggers the heartbeat.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::providers::{ChatMessage, ChatRequest, Provider, ToolDef};

/// Default tick interval: 30 minutes.
const DEFAULT_INTERVAL_SECS: u64 = 30 * 60;

/// Callback invoked when the model decides to run.
pub type HeartbeatCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Periodic heartbeat driver. Cloning shares the tick-loop handle.
#[derive(Clone)]
pub struct HeartbeatService {
    provider: Arc<dyn Provider>,
    model: String,
    workspace: PathBuf,
    interval: Duration,
    on_execute: HeartbeatCallback,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatDecision {
    #[serde(default)]
    action: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

fn decision_tool() -> ToolDef {
    ToolDef::new(
        "heartbeat_decision",
        "Decide whether to run the heartbeat action",
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["skip", "run"]},
                "reason": {"type": "string"},
                "message": {"type": "string", "description": "Message to process if action is run"}
            },
            "required": ["action"]
        }),
    )
}

impl HeartbeatService {
    /// Create a service; `interval_secs` of 0 uses the 30-minute default.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: &str,
        workspace: PathBuf,
        interval_secs: u64,
        on_execute: HeartbeatCallback,
    ) -> Self {
        Self {
            provider,
            model: model.to_string(),
            workspace,
            interval: Duration::from_secs(if interval_secs == 0 {
                DEFAULT_INTERVAL_SECS
            } else {
                interval_secs
            }),
            on_execute,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the tick loop. Idempotent; cancellation always wins.
    pub async fn start(&self, cancel: CancellationToken) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            warn!("Heartbeat service already running");
            return;
        }

        let service = self.clone();
        info!(interval_secs = self.interval.as_secs(), "Heartbeat service started");
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.interval);
            ticker.tick().await; // the first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Heartbeat service stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        service.tick(&cancel).await;
                    }
                }
            }
        }));
    }

    /// Stop the tick loop. Idempotent.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    /// Force one tick immediately.
    pub async fn trigger_now(&self, cancel: &CancellationToken) {
        self.tick(cancel).await;
    }

    async fn tick(&self, cancel: &CancellationToken) {
        let path = self.workspace.join("HEARTBEAT.md");
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("HEARTBEAT.md not found, skipping tick");
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to read HEARTBEAT.md");
                return;
            }
        };

        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(&content)],
            tools: vec![decision_tool()],
            ..Default::default()
        };

        let resp = tokio::select! {
            _ = cancel.cancelled() => return,
            resp = self.provider.chat(req) => match resp {
                Ok(resp) => resp,
                Err(e) => {
                    error!(error = %e, "Heartbeat decision call failed");
                    return;
                }
            },
        };

        let Some(tc) = resp.tool_calls.first() else {
            debug!("No decision tool call in heartbeat response, skipping");
            return;
        };
        let decision: HeartbeatDecision = match serde_json::from_str(&tc.arguments) {
            Ok(decision) => decision,
            Err(e) => {
                error!(error = %e, "Failed to parse heartbeat decision");
                return;
            }
        };

        match decision.action.as_str() {
            "run" => {
                info!(reason = %decision.reason, "Heartbeat decision: run");
                (self.on_execute)(decision.message);
            }
            "skip" => {
                info!(reason = %decision.reason, "Heartbeat decision: skip");
            }
            other => {
                warn!(action = %other, "Unknown heartbeat action");
            }
        }
    }
}
