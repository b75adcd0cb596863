//! Message bus module
//!
//! The `MessageBus` is the hub-and-spoke fabric at the centre of nanobot:
//! one inbound lane (channels, cron, sub-agents → agent loop) and one
//! outbound lane (agent loop → channels) with channel-scoped and wildcard
//! subscribers.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────>│  MessageBus │────>│  AgentLoop  │
//! │ (telegram)  │     │  (inbound)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │ outbound
//!        └───── subscribers ─┘
//! ```
//!
//! Both lanes are bounded (default 100); publishing into a full lane blocks
//! the publisher. That back-pressure is deliberate; there is no drop
//! policy.

pub mod message;

pub use message::{InboundMessage, Media, MediaKind, OutboundKind, OutboundMessage};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{NanobotError, Result};

/// Default buffer size for both bus lanes.
const DEFAULT_BUFFER_SIZE: usize = 100;

/// A synchronous outbound subscriber callback.
///
/// Handlers run on the dispatcher task under the subscriber read lock: they
/// must not call `subscribe` and must not block. A handler that needs to
/// publish back should spawn a task.
pub type Subscriber = Box<dyn Fn(OutboundMessage) + Send + Sync>;

/// The central message bus.
///
/// Cloning shares the underlying lanes and subscriber registry, so any
/// number of producers can hold the same bus.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    /// channel name -> subscribers; empty string = wildcard
    subscribers: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl MessageBus {
    /// Creates a bus with the default buffer size (100).
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a bus with a custom buffer size. A size of 0 falls back to
    /// the default.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publishes an inbound message. Blocks while the lane is full.
    ///
    /// # Errors
    /// Returns `NanobotError::BusClosed` if the bus has been closed.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| NanobotError::BusClosed)
    }

    /// Dequeues the next inbound message.
    ///
    /// # Errors
    /// - `NanobotError::Cancelled` if `cancel` fires while waiting
    /// - `NanobotError::BusClosed` if the lane is closed
    pub async fn consume_inbound(&self, cancel: &CancellationToken) -> Result<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(NanobotError::Cancelled),
            msg = rx.recv() => msg.ok_or(NanobotError::BusClosed),
        }
    }

    /// Publishes an outbound message. Blocks while the lane is full.
    ///
    /// # Errors
    /// Returns `NanobotError::BusClosed` if the bus has been closed.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| NanobotError::BusClosed)
    }

    /// Registers a synchronous callback for outbound messages.
    ///
    /// An empty channel name subscribes to all channels (wildcard).
    pub async fn subscribe<F>(&self, channel: &str, handler: F)
    where
        F: Fn(OutboundMessage) + Send + Sync + 'static,
    {
        let mut subs = self.subscribers.write().await;
        subs.entry(channel.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Drains the outbound lane, delivering each message to the
    /// channel-specific subscribers followed by the wildcard subscribers.
    ///
    /// Only one dispatcher should run at a time. Returns when `cancel`
    /// fires or the lane is closed.
    pub async fn dispatch_outbound(&self, cancel: &CancellationToken) {
        info!("Outbound dispatcher started");
        loop {
            let msg = {
                let mut rx = self.outbound_rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Outbound dispatcher cancelled");
                        break;
                    }
                    msg = rx.recv() => match msg {
                        Some(msg) => msg,
                        None => {
                            info!("Outbound lane closed");
                            break;
                        }
                    },
                }
            };
            self.dispatch(msg).await;
        }
        info!("Outbound dispatcher stopped");
    }

    /// Delivers one message to all matching subscribers.
    async fn dispatch(&self, msg: OutboundMessage) {
        let subs = self.subscribers.read().await;
        if let Some(handlers) = subs.get(&msg.channel) {
            for handler in handlers {
                handler(msg.clone());
            }
        }
        if let Some(handlers) = subs.get("") {
            for handler in handlers {
                handler(msg.clone());
            }
        }
        debug!(channel = %msg.channel, "Dispatched outbound message");
    }

    /// Returns a clone of the inbound sender, for producers that only
    /// publish (channels, cron).
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound_tx.clone()
    }

    /// Shuts both lanes. Pending messages may still be consumed; further
    /// publishes fail with `BusClosed`.
    pub async fn close(&self) {
        self.inbound_rx.lock().await.close();
        self.outbound_rx.lock().await.close();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones the bus, sharing the same underlying lanes and subscribers.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}
