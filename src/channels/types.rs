//! Channel trait and shared channel configuration.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::OutboundMessage;
use crate::error::Result;

/// The interface every chat platform adapter implements.
///
/// A channel translates platform events into inbound bus messages and
/// outbound bus messages into platform sends. Lifecycle: `start` begins
/// ingesting (long-poll, websocket, or webhook, the adapter's choice) until the
/// token fires; `stop` tears the connection down.
#[async_trait]
pub trait Channel: Send + Sync {
    /// The unique channel name used for routing (e.g. "telegram").
    fn name(&self) -> &str;

    /// Start ingesting platform events. Non-blocking: implementations
    /// spawn their own tasks and return.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Stop the channel and release its resources.
    async fn stop(&self) -> Result<()>;

    /// Deliver one outbound message to the platform.
    async fn send(&self, msg: OutboundMessage) -> Result<()>;

    /// Whether a sender is allowed to use this channel.
    fn is_allowed(&self, sender_id: &str) -> bool;
}

/// Allowlist shared by channel adapters: empty list admits everyone.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    allowed: Vec<String>,
}

impl Allowlist {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|a| a == sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allowlist_admits_everyone() {
        let list = Allowlist::default();
        assert!(list.is_allowed("anyone"));
    }

    #[test]
    fn test_allowlist_filters() {
        let list = Allowlist::new(vec!["user1".into(), "user2".into()]);
        assert!(list.is_allowed("user1"));
        assert!(list.is_allowed("user2"));
        assert!(!list.is_allowed("user3"));
    }
}
