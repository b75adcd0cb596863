//! MCP stdio client — JSON-RPC 2.0 over a child process's stdin/stdout.
//!
//! Framing is one request or response per `\n`-terminated UTF-8 JSON line.
//! A single reader task owns stdout and resolves pending requests through a
//! correlation map; stdin writes are serialised by their own lock; stderr is
//! relayed line-by-line to the operator log.
//!
//! Lifecycle: spawn → `initialize` (≤10 s) → `notifications/initialized` →
//! `tools/list` / `tools/call` on demand → `close()` (drop stdin, kill,
//! reap).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NanobotError, Result};

/// MCP protocol version sent in the initialize handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Timeout for the initialize round-trip.
const INIT_TIMEOUT_SECS: u64 = 10;

/// Configuration for one MCP server sub-process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Executable to spawn
    pub command: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables merged over the parent environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-tool-call timeout in seconds (default 30)
    #[serde(default, rename = "toolTimeout")]
    pub tool_timeout: u64,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// A tool definition reported by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

type PendingMap = Arc<StdMutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

/// Removes a pending entry when a request ends on any path: reply, error,
/// cancel, or the caller dropping the future at a timeout.
struct PendingGuard {
    pending: PendingMap,
    id: i64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

/// A connected MCP server sub-process.
pub struct McpClient {
    server_name: String,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    request_id: AtomicI64,
    pending: PendingMap,
    /// Fires when the client is closed; unblocks in-flight requests.
    closed: CancellationToken,
}

impl McpClient {
    /// Spawn the server process and perform the initialize handshake.
    pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Arc<Self>> {
        if config.command.is_empty() {
            return Err(NanobotError::Mcp(format!(
                "MCP server {}: command is required",
                name
            )));
        }

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| NanobotError::Mcp(format!("failed to start MCP server {}: {}", name, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| NanobotError::Mcp("failed to open stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| NanobotError::Mcp("failed to open stdout pipe".into()))?;
        let stderr = child.stderr.take();

        let client = Arc::new(Self {
            server_name: name.to_string(),
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            request_id: AtomicI64::new(0),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            closed: CancellationToken::new(),
        });

        // Reader task: parse one response per line, resolve the pending entry.
        {
            let pending = Arc::clone(&client.pending);
            let closed = client.closed.clone();
            let server = client.server_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    let line = tokio::select! {
                        _ = closed.cancelled() => break,
                        line = lines.next_line() => line,
                    };
                    match line {
                        Ok(Some(line)) => {
                            let resp: JsonRpcResponse = match serde_json::from_str(&line) {
                                Ok(resp) => resp,
                                Err(e) => {
                                    warn!(target: "mcp", server = %server, error = %e,
                                          "Failed to parse JSON-RPC line");
                                    continue;
                                }
                            };
                            let sender = pending
                                .lock()
                                .ok()
                                .and_then(|mut p| p.remove(&resp.id));
                            if let Some(sender) = sender {
                                let _ = sender.send(resp);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(target: "mcp", server = %server, error = %e, "Read loop error");
                            break;
                        }
                    }
                }
                debug!(target: "mcp", server = %server, "Reader task finished");
            });
        }

        // Relay stderr to the operator log.
        if let Some(stderr) = stderr {
            let server = client.server_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "mcp", server = %server, "stderr: {}", line);
                }
            });
        }

        // Initialize handshake.
        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "nanobot",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let init_cancel = CancellationToken::new();
        let init = tokio::time::timeout(
            std::time::Duration::from_secs(INIT_TIMEOUT_SECS),
            client.send_request(&init_cancel, "initialize", Some(init_params)),
        )
        .await;
        match init {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                client.close().await;
                return Err(NanobotError::Mcp(format!(
                    "failed to initialize MCP server {}: {}",
                    name, e
                )));
            }
            Err(_) => {
                client.close().await;
                return Err(NanobotError::Mcp(format!(
                    "MCP server {} did not answer initialize within {}s",
                    name, INIT_TIMEOUT_SECS
                )));
            }
        }

        client.send_notification("notifications/initialized", None).await?;

        info!(target: "mcp", server = %name, "MCP client connected");
        Ok(client)
    }

    /// The server name this client was configured with.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Send a request and wait for the correlated response.
    ///
    /// The pending entry is removed on every exit path: reply received,
    /// write failure, cancellation, client close, or the caller dropping
    /// this future (per-call timeouts do exactly that).
    pub async fn send_request(
        &self,
        cancel: &CancellationToken,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst) + 1;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| NanobotError::Mcp("pending map poisoned".into()))?
            .insert(id, tx);
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            id,
        };

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };
        self.write_line(&request).await?;

        tokio::select! {
            resp = rx => match resp {
                Ok(resp) => {
                    if let Some(err) = resp.error {
                        return Err(NanobotError::Mcp(format!(
                            "JSON-RPC error {}: {}",
                            err.code, err.message
                        )));
                    }
                    Ok(resp.result.unwrap_or(Value::Null))
                }
                Err(_) => Err(NanobotError::Mcp("MCP client closed".into())),
            },
            _ = cancel.cancelled() => Err(NanobotError::Cancelled),
            _ = self.closed.cancelled() => Err(NanobotError::Mcp("MCP client closed".into())),
        }
    }

    /// Send a notification (no id, no reply).
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        };
        self.write_line(&request).await
    }

    async fn write_line(&self, request: &JsonRpcRequest<'_>) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        let stdin = stdin
            .as_mut()
            .ok_or_else(|| NanobotError::Mcp("MCP client closed".into()))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| NanobotError::Mcp(format!("failed to write request: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| NanobotError::Mcp(format!("failed to flush request: {}", e)))?;
        Ok(())
    }

    /// Enumerate the server's tools via `tools/list`.
    pub async fn list_tools(&self, cancel: &CancellationToken) -> Result<Vec<McpToolDef>> {
        let result = self
            .send_request(cancel, "tools/list", Some(json!({})))
            .await?;

        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            tools: Vec<McpToolDef>,
        }
        let response: ListResponse = serde_json::from_value(result)
            .map_err(|e| NanobotError::Mcp(format!("failed to parse tools list: {}", e)))?;
        Ok(response.tools)
    }

    /// Invoke a tool via `tools/call`, concatenating all text-typed content
    /// parts in order.
    pub async fn call_tool(
        &self,
        cancel: &CancellationToken,
        tool_name: &str,
        args: Value,
    ) -> Result<String> {
        let result = self
            .send_request(
                cancel,
                "tools/call",
                Some(json!({"name": tool_name, "arguments": args})),
            )
            .await?;

        #[derive(Deserialize)]
        struct CallResponse {
            #[serde(default)]
            content: Vec<ContentItem>,
        }
        #[derive(Deserialize)]
        struct ContentItem {
            #[serde(rename = "type", default)]
            kind: String,
            #[serde(default)]
            text: String,
        }

        let response: CallResponse = serde_json::from_value(result)
            .map_err(|e| NanobotError::Mcp(format!("failed to parse tool response: {}", e)))?;

        let mut output = String::new();
        for item in response.content {
            if item.kind == "text" {
                output.push_str(&item.text);
            }
        }
        Ok(output)
    }

    /// Shut down: fail in-flight requests, drop stdin, kill, and reap the
    /// process. Idempotent.
    pub async fn close(&self) {
        self.closed.cancel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        self.stdin.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}
