//! Telegram channel adapter: long-polling ingest via `getUpdates`, egress
//! via `sendMessage`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::TelegramConfig;
use crate::error::{NanobotError, Result};

use super::{Allowlist, Channel};

const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram bot channel. Clones share the update offset.
#[derive(Clone)]
pub struct TelegramChannel {
    token: String,
    api_base: String,
    allowlist: Allowlist,
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    /// Highest update id seen, for the getUpdates offset.
    last_update_id: Arc<AtomicI64>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, bus: Arc<MessageBus>) -> Self {
        Self::with_api_base(config, bus, "https://api.telegram.org")
    }

    /// Custom API base, used by tests.
    pub fn with_api_base(config: &TelegramConfig, bus: Arc<MessageBus>, api_base: &str) -> Self {
        Self {
            token: config.token.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
            allowlist: Allowlist::new(config.allowed_users.clone()),
            bus,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(POLL_TIMEOUT_SECS + 10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            last_update_id: Arc::new(AtomicI64::new(0)),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn poll_once(&self) -> Result<()> {
        let offset = self.last_update_id.load(Ordering::SeqCst) + 1;
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NanobotError::Channel(format!(
                "getUpdates returned {}",
                response.status()
            )));
        }

        let body: UpdatesResponse = response.json().await?;
        for update in body.result {
            self.last_update_id.fetch_max(update.update_id, Ordering::SeqCst);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let sender_id = message
                .from
                .map(|u| u.id.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            if !self.allowlist.is_allowed(&sender_id) {
                debug!(sender = %sender_id, "Telegram sender not in allowlist, dropping");
                continue;
            }

            let inbound = InboundMessage::new(
                "telegram",
                &sender_id,
                &message.chat.id.to_string(),
                &text,
            )
            .with_metadata("message_id", &message.message_id.to_string());
            if let Err(e) = self.bus.publish_inbound(inbound).await {
                warn!(error = %e, "Failed to publish Telegram inbound");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        if self.token.is_empty() {
            return Err(NanobotError::Channel("telegram token is empty".into()));
        }

        let channel = self.clone();
        tokio::spawn(async move {
            info!("Telegram channel started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Telegram channel stopped");
                        return;
                    }
                    result = channel.poll_once() => {
                        if let Err(e) = result {
                            warn!(error = %e, "Telegram poll failed, backing off");
                            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        let mut payload = json!({
            "chat_id": msg.chat_id,
            "text": msg.content,
        });
        if let Some(reply_to) = &msg.reply_to {
            payload["reply_to_message_id"] = json!(reply_to);
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NanobotError::Channel(format!(
                "sendMessage returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowlist.is_allowed(sender_id)
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    #[serde(default)]
    from: Option<TgUser>,
    chat: TgChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}
