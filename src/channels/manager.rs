//! Channel manager: channel lifecycle plus outbound routing.
//!
//! The manager subscribes a single wildcard handler on the bus. The handler
//! drops `progress` and `tool_hint` messages (in-process observability,
//! never user-visible) and routes the rest to the adapter whose name
//! matches the message's channel. Because bus handlers are synchronous and
//! adapter sends are async, the handler forwards through an unbounded
//! channel drained by a delivery task.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::Result;

use super::Channel;

/// Manages registered channels and dispatches outbound messages to them.
pub struct ChannelManager {
    channels: Arc<RwLock<HashMap<String, Arc<dyn Channel>>>>,
    bus: Arc<MessageBus>,
    delivery_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            bus,
            delivery_handle: Mutex::new(None),
        }
    }

    /// Register a channel adapter under its name.
    pub async fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "Registering channel");
        self.channels.write().await.insert(name, channel);
    }

    /// Names of registered channels, sorted.
    pub async fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a channel is registered.
    pub async fn has_channel(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(name)
    }

    /// Start every registered channel and hook up outbound delivery.
    ///
    /// Individual channel start failures are logged and do not prevent the
    /// others from starting.
    pub async fn start_all(&self, cancel: CancellationToken) -> Result<()> {
        // A second start would register a duplicate bus subscriber.
        {
            let delivery = self.delivery_handle.lock().await;
            if delivery.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
                warn!("Channel manager already started, skipping");
                return Ok(());
            }
        }

        {
            let channels = self.channels.read().await;
            for (name, channel) in channels.iter() {
                info!(channel = %name, "Starting channel");
                if let Err(e) = channel.start(cancel.clone()).await {
                    error!(channel = %name, error = %e, "Failed to start channel");
                }
            }
        }

        // Forwarding queue between the synchronous bus handler and the
        // async adapter sends.
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
        self.bus
            .subscribe("", move |msg: OutboundMessage| {
                // Reserved kinds never surface to end users.
                if !msg.kind.is_user_visible() {
                    return;
                }
                let _ = tx.send(msg);
            })
            .await;

        let channels = Arc::clone(&self.channels);
        let delivery_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = delivery_cancel.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let channel = {
                    let channels = channels.read().await;
                    channels.get(&msg.channel).cloned()
                };
                match channel {
                    Some(channel) => {
                        if let Err(e) = channel.send(msg.clone()).await {
                            error!(channel = %msg.channel, error = %e, "Failed to send message");
                        }
                    }
                    None => {
                        warn!(channel = %msg.channel, "Unknown channel for outbound message");
                    }
                }
            }
        });
        *self.delivery_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Stop all channels and the delivery task.
    pub async fn stop_all(&self) -> Result<()> {
        if let Some(handle) = self.delivery_handle.lock().await.take() {
            handle.abort();
        }
        let channels = self.channels.read().await;
        for (name, channel) in channels.iter() {
            info!(channel = %name, "Stopping channel");
            if let Err(e) = channel.stop().await {
                error!(channel = %name, error = %e, "Failed to stop channel");
            }
        }
        Ok(())
    }
}
