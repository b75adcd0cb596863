//! Channels module — chat platform adapters and their manager
//!
//! Each adapter implements [`Channel`]: inbound platform events become bus
//! messages, outbound bus messages become platform sends. The
//! [`ChannelManager`] owns the adapters and routes user-visible outbound
//! traffic to them.

pub mod manager;
pub mod telegram;
mod types;

pub use manager::ChannelManager;
pub use telegram::TelegramChannel;
pub use types::{Allowlist, Channel};

use std::sync::Arc;

use crate::bus::MessageBus;
use crate::config::Config;

/// Register every channel enabled in the config. Returns how many were
/// registered.
pub async fn register_configured_channels(
    manager: &ChannelManager,
    bus: Arc<MessageBus>,
    config: &Config,
) -> usize {
    let mut count = 0;

    if let Some(telegram) = &config.channels.telegram {
        if telegram.enabled && !telegram.token.is_empty() {
            manager
                .register(Arc::new(TelegramChannel::new(telegram, Arc::clone(&bus))))
                .await;
            count += 1;
        }
    }

    count
}
