//! Shell tool: `run_shell` executes a command via `sh -c` with a timeout
//! and bounded output.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::{NanobotError, Result};

use super::{Tool, ToolContext};

const MAX_OUTPUT_LEN: usize = 10_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Execute a shell command and return its combined output.
pub struct RunShellTool;

#[async_trait]
impl Tool for RunShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to execute"},
                "timeout": {"type": "integer", "description": "Timeout in seconds (default 30)"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NanobotError::Tool("missing 'command' argument".into()))?;
        let timeout_secs = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);
        if let Some(workspace) = &ctx.workspace {
            cmd.current_dir(workspace);
        }

        let run = cmd.output();
        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(NanobotError::Cancelled),
            result = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), run) => {
                result
                    .map_err(|_| NanobotError::Tool(format!("command timed out after {}s", timeout_secs)))?
                    .map_err(|e| NanobotError::Tool(format!("failed to run command: {}", e)))?
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if combined.len() > MAX_OUTPUT_LEN {
            let mut cut = MAX_OUTPUT_LEN;
            while !combined.is_char_boundary(cut) {
                cut -= 1;
            }
            combined.truncate(cut);
            combined.push_str("\n[output truncated]");
        }

        if !output.status.success() {
            return Err(NanobotError::Tool(format!(
                "{}\nexit status: {}",
                combined, output.status
            )));
        }
        Ok(combined)
    }
}
