//! Cron management tool: `manage_cron` adds, removes, and lists scheduled
//! jobs from inside a conversation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cron::{CronSchedule, CronService};
use crate::error::{NanobotError, Result};

use super::{Tool, ToolContext};

/// Add, remove, or list cron jobs.
pub struct ManageCronTool {
    service: Arc<CronService>,
}

impl ManageCronTool {
    pub fn new(service: Arc<CronService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for ManageCronTool {
    fn name(&self) -> &str {
        "manage_cron"
    }

    fn description(&self) -> &str {
        "Add, remove, or list cron jobs"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "remove", "list"],
                    "description": "Action to perform"
                },
                "schedule": {
                    "type": "string",
                    "description": "Schedule: 'at HH:MM', 'every DURATION', or a cron expression (for add)"
                },
                "message": {
                    "type": "string",
                    "description": "Message to send (for add)"
                },
                "session_key": {
                    "type": "string",
                    "description": "Target session (for add; defaults to the current one)"
                },
                "job_id": {
                    "type": "string",
                    "description": "Job ID (for remove)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NanobotError::Tool("missing 'action' argument".into()))?;

        match action {
            "add" => {
                let schedule = args
                    .get("schedule")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| NanobotError::Tool("schedule is required for add".into()))?;
                let message = args
                    .get("message")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| NanobotError::Tool("message is required for add".into()))?;
                let session_key = match args.get("session_key").and_then(|v| v.as_str()) {
                    Some(key) if !key.is_empty() => key.to_string(),
                    _ => match (&ctx.channel, &ctx.chat_id) {
                        (Some(channel), Some(chat_id)) => format!("{}:{}", channel, chat_id),
                        _ => {
                            return Err(NanobotError::Tool(
                                "session_key is required for add".into(),
                            ))
                        }
                    },
                };

                let id = self
                    .service
                    .add_job(CronSchedule::parse(schedule), message, &session_key)
                    .await?;
                Ok(format!("Cron job added: {}", id))
            }
            "remove" => {
                let job_id = args
                    .get("job_id")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| NanobotError::Tool("job_id is required for remove".into()))?;
                self.service.remove_job(job_id).await?;
                Ok(format!("Cron job removed: {}", job_id))
            }
            "list" => {
                let jobs = self.service.list_jobs().await;
                if jobs.is_empty() {
                    return Ok("No cron jobs scheduled".to_string());
                }
                let lines: Vec<String> = jobs
                    .iter()
                    .map(|j| {
                        format!(
                            "{}: [{:?} {}] \"{}\" -> {}",
                            j.id,
                            j.schedule.schedule_type,
                            j.schedule.expression,
                            j.message,
                            j.session_key
                        )
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            other => Err(NanobotError::Tool(format!(
                "invalid action: {} (must be add, remove, or list)",
                other
            ))),
        }
    }
}
